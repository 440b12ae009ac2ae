mod common;

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::{Duration, Instant};

use common::Panel;
use panelvisor::events::kinds;
use panelvisor::hal::ScreenContent;
use panelvisor::events::Event;
use panelvisor::{
    AppApi, AppError, AppFn, AppRegistry, Color, HandlerError, HandlerFn, Hardware, RunnerStatus,
    StopSignal,
};
use serde_json::json;

const WAIT: Duration = Duration::from_secs(5);

async fn until(within: Duration, cond: impl Fn() -> bool) {
    let deadline = Instant::now() + within;
    while !cond() {
        assert!(Instant::now() < deadline, "condition not met within {within:?}");
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
}

fn hello(timeout: u64) -> serde_json::Value {
    json!({"name": "Hello", "entry_point": "hello_world", "timeout_seconds": timeout})
}

#[tokio::test(flavor = "multi_thread")]
async fn go_press_launches_mapped_app_in_order() {
    let panel = Panel::start(
        &[("hello_world", hello(60))],
        json!({"1": "hello_world"}),
        AppRegistry::with_builtins(),
        1,
    );

    panel.sim.simulate_go();
    let started = panel.rec.wait_type(kinds::APP_STARTED, WAIT).await;
    assert_eq!(started.get_str("app_name"), Some("hello_world"));
    assert_eq!(started.get_u64("switch_value"), Some(1));

    let types = panel.rec.types();
    let requested = types
        .iter()
        .position(|t| t == kinds::APP_LAUNCH_REQUESTED)
        .unwrap();
    let started_at = types.iter().position(|t| t == kinds::APP_STARTED).unwrap();
    assert!(requested < started_at);
    assert_eq!(
        panel.rec.of_type(kinds::APP_LAUNCH_REQUESTED)[0].get_u64("switch_value"),
        Some(1)
    );

    let sim = panel.sim.clone();
    until(WAIT, move || {
        sim.surface().current() == ScreenContent::Text("Hello, panel!".into())
    })
    .await;
    let sim = panel.sim.clone();
    until(WAIT, move || sim.leds() == [true; 4]).await;
    assert_eq!(panel.sim.display_value(), Some(1));

    panel.system.shutdown("test").await.unwrap();
    let finished = panel.rec.of_type(kinds::APP_FINISHED);
    assert_eq!(finished.len(), 1);
    assert_eq!(finished[0].get_str("reason"), Some("stopped"));
    assert_eq!(panel.sim.leds(), [false; 4]);
    assert!(panel.sim.is_shut_down());
}

#[tokio::test(flavor = "multi_thread")]
async fn unmapped_switch_shows_message_and_runs_nothing() {
    let panel = Panel::start(
        &[("hello_world", hello(60))],
        json!({"1": "hello_world"}),
        AppRegistry::with_builtins(),
        7,
    );

    panel.sim.simulate_go();
    let requested = panel.rec.wait_type(kinds::APP_LAUNCH_REQUESTED, WAIT).await;
    assert_eq!(requested.get_u64("switch_value"), Some(7));

    let sim = panel.sim.clone();
    until(WAIT, move || {
        sim.surface().current() == ScreenContent::Text("No app mapped to switch 7".into())
    })
    .await;
    tokio::time::sleep(Duration::from_millis(100)).await;
    assert!(panel.rec.of_type(kinds::APP_STARTED).is_empty());
    assert_eq!(panel.system.runner().status(), RunnerStatus::Idle);

    panel.system.shutdown("test").await.unwrap();
}

#[tokio::test(flavor = "multi_thread")]
async fn cooperative_app_times_out() {
    let panel = Panel::start(
        &[("hello_world", hello(1))],
        json!({"1": "hello_world"}),
        AppRegistry::with_builtins(),
        1,
    );

    let t0 = Instant::now();
    panel.sim.simulate_go();
    panel.rec.wait_type(kinds::APP_STARTED, WAIT).await;
    let mut status = panel.system.runner().watch_status();
    tokio::time::timeout(WAIT, status.wait_for(|s| *s == RunnerStatus::TimedOut))
        .await
        .unwrap()
        .unwrap();

    let finished = panel.rec.wait_type(kinds::APP_FINISHED, WAIT).await;
    assert!(t0.elapsed() < Duration::from_secs(3));
    assert_eq!(finished.get_str("app_name"), Some("hello_world"));
    assert_eq!(finished.get_str("reason"), Some("timeout"));
    panel.wait_idle(WAIT).await;
    assert_eq!(panel.sim.leds(), [false; 4]);

    panel.system.shutdown("test").await.unwrap();
}

#[tokio::test(flavor = "multi_thread")]
async fn stubborn_app_is_abandoned_after_grace() {
    let release = StopSignal::new();
    let gate = release.clone();
    let late_done = StopSignal::new();
    let late_flag = late_done.clone();
    let late_rejected = Arc::new(AtomicBool::new(false));
    let rejected = Arc::clone(&late_rejected);
    let registry = AppRegistry::with_builtins().with(
        "stubborn",
        AppFn::arc(move |_stop: &StopSignal, api: &AppApi| {
            api.set_led(Color::Yellow, true)?;
            api.display_text("not listening");
            gate.wait(Duration::from_secs(30));
            // Outlived its execution: the API is closed.
            let noop = HandlerFn::arc("late", |_e: &Event| Ok::<_, HandlerError>(()));
            let sub = api.subscribe(kinds::BUTTON_PRESSED, noop, None);
            let led = api.set_led(Color::Red, true);
            api.display_text("still here");
            rejected.store(
                matches!(sub, Err(AppError::Closed { .. }))
                    && matches!(led, Err(AppError::Closed { .. })),
                Ordering::SeqCst,
            );
            late_flag.set();
            Ok(())
        }),
    );
    let panel = Panel::start(
        &[("stubborn", json!({"name": "Stubborn", "entry_point": "stubborn", "timeout_seconds": 1}))],
        json!({"4": "stubborn"}),
        registry,
        4,
    );

    let t0 = Instant::now();
    panel.sim.simulate_go();
    let finished = panel.rec.wait_type(kinds::APP_FINISHED, WAIT).await;
    // timeout (1 s) + grace (200 ms) + scheduling slack
    assert!(t0.elapsed() < Duration::from_millis(2500));
    assert_eq!(finished.get_str("reason"), Some("timeout"));
    panel.wait_idle(WAIT).await;
    assert_eq!(panel.sim.leds(), [false; 4]);
    let subs = panel.system.bus().subscription_count();

    release.set();
    assert!(late_done.wait(WAIT));
    assert!(late_rejected.load(Ordering::SeqCst));
    tokio::time::sleep(Duration::from_millis(100)).await;
    assert_eq!(panel.system.bus().subscription_count(), subs);
    assert_eq!(panel.sim.leds(), [false; 4]);
    assert_ne!(
        panel.sim.surface().current(),
        ScreenContent::Text("still here".into())
    );

    panel.system.shutdown("test").await.unwrap();
}

#[tokio::test(flavor = "multi_thread")]
async fn rapid_go_presses_preempt_the_first_app() {
    let first_stopped = Arc::new(AtomicBool::new(false));
    let flag = Arc::clone(&first_stopped);
    let second_saw_first_stopped = Arc::new(AtomicBool::new(false));
    let saw = Arc::clone(&second_saw_first_stopped);

    let registry = AppRegistry::new()
        .with(
            "first",
            AppFn::arc(move |stop: &StopSignal, api: &AppApi| {
                api.display_text("first");
                while !stop.wait(Duration::from_millis(10)) {}
                flag.store(true, Ordering::SeqCst);
                Ok(())
            }),
        )
        .with(
            "second",
            AppFn::arc(move |stop: &StopSignal, api: &AppApi| {
                saw.store(first_stopped.load(Ordering::SeqCst), Ordering::SeqCst);
                api.display_text("second");
                while !stop.wait(Duration::from_millis(10)) {}
                Ok(())
            }),
        );
    let panel = Panel::start(
        &[
            ("one", json!({"name": "One", "entry_point": "first"})),
            ("two", json!({"name": "Two", "entry_point": "second"})),
        ],
        json!({"1": "one", "2": "two"}),
        registry,
        1,
    );

    panel.sim.simulate_go();
    panel
        .rec
        .wait_for(WAIT, |e| {
            e.is(kinds::APP_LAUNCH_REQUESTED) && e.get_u64("switch_value") == Some(1)
        })
        .await;
    panel.sim.simulate_change(2);
    panel.sim.simulate_go();

    panel
        .rec
        .wait_for(WAIT, |e| {
            e.is(kinds::APP_STARTED) && e.get_str("app_name") == Some("two")
        })
        .await;
    panel.wait_running(WAIT).await;

    let started: Vec<String> = panel
        .rec
        .of_type(kinds::APP_STARTED)
        .iter()
        .filter_map(|e| e.get_str("app_name").map(str::to_string))
        .collect();
    assert_eq!(started.iter().filter(|n| *n == "two").count(), 1);
    assert_eq!(panel.system.runner().current_app().as_deref(), Some("two"));

    if started.iter().any(|n| n == "one") {
        assert!(second_saw_first_stopped.load(Ordering::SeqCst));
        let events = panel.rec.events();
        let one_done = events
            .iter()
            .position(|e| e.is(kinds::APP_FINISHED) && e.get_str("app_name") == Some("one"))
            .unwrap();
        let two_started = events
            .iter()
            .position(|e| e.is(kinds::APP_STARTED) && e.get_str("app_name") == Some("two"))
            .unwrap();
        assert!(one_done < two_started);
    }

    panel.system.shutdown("test").await.unwrap();
}

type AppSet = (Vec<(String, serde_json::Value)>, serde_json::Value, AppRegistry);

/// Cooperative apps `app1..=app{n}` mapped to switches `1..=n`, sharing a live
/// worker counter that records the highest overlap seen.
fn counted_apps(n: u8, live: &Arc<AtomicUsize>, peak: &Arc<AtomicUsize>) -> AppSet {
    let mut registry = AppRegistry::new();
    let mut apps = Vec::new();
    let mut mappings = serde_json::Map::new();
    for v in 1..=n {
        let name = format!("app{v}");
        let (live, peak) = (Arc::clone(live), Arc::clone(peak));
        registry.register(
            name.clone(),
            AppFn::arc(move |stop: &StopSignal, _api: &AppApi| {
                let now = live.fetch_add(1, Ordering::SeqCst) + 1;
                peak.fetch_max(now, Ordering::SeqCst);
                while !stop.wait(Duration::from_millis(5)) {}
                live.fetch_sub(1, Ordering::SeqCst);
                Ok(())
            }),
        );
        apps.push((name.clone(), json!({"name": name, "entry_point": name})));
        mappings.insert(v.to_string(), json!(name));
    }
    (apps, serde_json::Value::Object(mappings), registry)
}

#[tokio::test(flavor = "multi_thread")]
async fn rapid_launches_leave_only_the_last_running() {
    for (n, gap_ms) in [(3u8, 0u64), (6, 0), (4, 40), (5, 15)] {
        let live = Arc::new(AtomicUsize::new(0));
        let peak = Arc::new(AtomicUsize::new(0));
        let (apps, mappings, registry) = counted_apps(n, &live, &peak);
        let apps: Vec<(&str, serde_json::Value)> =
            apps.iter().map(|(d, m)| (d.as_str(), m.clone())).collect();
        let panel = Panel::start(&apps, mappings, registry, 0);

        for v in 1..=n {
            panel.sim.simulate_change(v);
            panel.sim.simulate_go();
            if gap_ms > 0 {
                tokio::time::sleep(Duration::from_millis(gap_ms)).await;
            }
        }

        let last = format!("app{n}");
        let deadline = Instant::now() + Duration::from_secs(10);
        loop {
            assert!(Instant::now() < deadline, "n={n}: {last} never settled");
            let requested = panel.rec.of_type(kinds::APP_LAUNCH_REQUESTED).len();
            let runner = panel.system.runner();
            if requested == usize::from(n)
                && runner.status() == RunnerStatus::Running
                && runner.current_app().as_deref() == Some(last.as_str())
            {
                let before = panel.rec.events().len();
                tokio::time::sleep(Duration::from_millis(200)).await;
                if panel.rec.events().len() == before
                    && runner.current_app().as_deref() == Some(last.as_str())
                {
                    break;
                }
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }

        // At most one execution is non-terminal at any point of the event stream.
        let mut current: Option<String> = None;
        for e in panel.rec.events() {
            if e.is(kinds::APP_STARTED) {
                assert_eq!(current, None, "n={n}: overlapping executions");
                current = e.get_str("app_name").map(str::to_string);
            } else if e.is(kinds::APP_FINISHED) || e.is(kinds::APP_ERROR) {
                let name = e.get_str("app_name").map(str::to_string);
                assert_eq!(current.take(), name, "n={n}: terminal without start");
            }
        }
        assert_eq!(current.as_deref(), Some(last.as_str()));
        assert_eq!(live.load(Ordering::SeqCst), 1);
        assert_eq!(peak.load(Ordering::SeqCst), 1);

        panel.system.shutdown("test").await.unwrap();
        let started = panel.rec.of_type(kinds::APP_STARTED).len();
        let ended = panel.rec.of_type(kinds::APP_FINISHED).len()
            + panel.rec.of_type(kinds::APP_ERROR).len();
        assert_eq!(started, ended, "n={n}: every execution reached a terminal state");
    }
}

#[tokio::test(flavor = "multi_thread")]
async fn failing_app_reports_error_and_panel_recovers() {
    let registry = AppRegistry::new().with(
        "broken",
        AppFn::arc(|_stop: &StopSignal, api: &AppApi| {
            api.set_led(Color::Red, true)?;
            Err(AppError::msg("sensor unplugged"))
        }),
    );
    let panel = Panel::start(
        &[("broken", json!({"name": "Broken", "entry_point": "broken"}))],
        json!({"3": "broken"}),
        registry,
        3,
    );

    panel.sim.simulate_go();
    let err = panel.rec.wait_type(kinds::APP_ERROR, WAIT).await;
    assert_eq!(err.get_str("app_name"), Some("broken"));
    assert_eq!(err.get_str("error"), Some("sensor unplugged"));
    panel.wait_idle(WAIT).await;
    assert_eq!(panel.sim.leds(), [false; 4]);

    let sim = panel.sim.clone();
    until(WAIT, move || sim.surface().current() == ScreenContent::Clear).await;
    assert_eq!(panel.sim.display_value(), Some(3));

    // The launcher survives and can launch again.
    panel.sim.simulate_go();
    panel
        .rec
        .wait_for(WAIT, |e| e.is(kinds::APP_ERROR) && e.seq > err.seq)
        .await;

    panel.system.shutdown("test").await.unwrap();
}

#[tokio::test(flavor = "multi_thread")]
async fn switch_changes_update_display_while_idle() {
    let panel = Panel::start(&[], json!({}), AppRegistry::with_builtins(), 0);

    panel.sim.simulate_change(42);
    let updated = panel
        .rec
        .wait_for(WAIT, |e| {
            e.is(kinds::DISPLAY_UPDATED) && e.get_u64("value") == Some(42)
        })
        .await;
    assert!(updated.seq > 0);
    assert_eq!(panel.sim.display_value(), Some(42));
    assert!(!panel.sim.simulate_change(42));

    panel.system.shutdown("test").await.unwrap();
}

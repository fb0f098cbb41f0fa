//! Failure injection tests for breakers and backend groups.

use std::thread;
use std::time::Duration;

use traffic_core::config::parse_config;
use traffic_core::load_balancer::{BackendManager, DispatchError, PoolError, SelectError, Strategy};
use traffic_core::resilience::{CircuitBreaker, CircuitState};

mod common;

#[test]
fn test_breaker_full_cycle() {
    let backend = common::ProgrammableBackend::new(|n| if n < 3 { Err("503") } else { Ok(()) });
    let cb = CircuitBreaker::new("orders", 3, Duration::from_millis(200));

    for _ in 0..3 {
        assert!(cb.call(|| backend.handle()).is_err());
    }
    assert_eq!(cb.state(), CircuitState::Open);

    // rejected without reaching the backend
    let err = cb.call(|| backend.handle()).unwrap_err();
    assert!(err.is_open());
    assert_eq!(backend.calls(), 3);

    thread::sleep(Duration::from_millis(300));
    cb.call(|| backend.handle()).unwrap();
    assert_eq!(cb.state(), CircuitState::Closed);
    assert_eq!(cb.failure_count(), 0);
    assert_eq!(backend.calls(), 4);
}

#[test]
fn test_failed_probe_reopens_and_restarts_timer() {
    let backend = common::ProgrammableBackend::new(|_| Err("refused"));
    let cb = CircuitBreaker::new("search", 1, Duration::from_millis(200));

    cb.call(|| backend.handle()).unwrap_err();
    thread::sleep(Duration::from_millis(300));

    let err = cb.call(|| backend.handle()).unwrap_err();
    assert!(!err.is_open());
    assert_eq!(cb.state(), CircuitState::Open);

    // the timer restarted at the probe failure
    assert!(cb.call(|| backend.handle()).unwrap_err().is_open());
    assert_eq!(backend.calls(), 2);
}

#[test]
fn test_group_isolates_failing_backend() {
    let config = common::group_config(
        "web",
        Strategy::RoundRobin,
        &[("good:80", 1), ("bad:80", 1)],
    );
    let manager = BackendManager::new(&config);

    let mut rejected = 0;
    let mut served = 0;
    for _ in 0..20 {
        match manager.call("web", None, |backend| {
            if backend == "bad:80" {
                Err("connection reset")
            } else {
                Ok(())
            }
        }) {
            Ok(()) => served += 1,
            Err(DispatchError::CircuitOpen { backend }) => {
                assert_eq!(backend, "bad:80");
                rejected += 1;
            }
            Err(DispatchError::Call { backend, .. }) => assert_eq!(backend, "bad:80"),
            Err(e) => panic!("unexpected error: {}", e),
        }
    }

    // round robin alternates, so each backend saw 10 picks
    assert_eq!(served, 10);
    assert_eq!(rejected, 10 - 3);
    assert_eq!(
        manager.breakers().states(),
        vec![
            ("bad:80".to_string(), CircuitState::Open),
            ("good:80".to_string(), CircuitState::Closed),
        ]
    );
}

#[test]
fn test_group_recovers_after_reset_timeout() {
    let config = common::group_config("api", Strategy::LeastConnections, &[("only:80", 1)]);
    let manager = BackendManager::new(&config);

    for _ in 0..3 {
        manager.call("api", None, |_| Err::<(), _>("timeout")).unwrap_err();
    }
    assert!(matches!(
        manager.call("api", None, |_| Ok::<_, &str>(())),
        Err(DispatchError::CircuitOpen { .. })
    ));

    thread::sleep(Duration::from_millis(300));
    manager.call("api", None, |_| Ok::<_, &str>(())).unwrap();
    assert_eq!(
        manager.breakers().get("only:80").unwrap().state(),
        CircuitState::Closed
    );
}

#[test]
fn test_removed_backend_no_longer_selected() {
    let config = common::group_config(
        "cache",
        Strategy::ConsistentHash,
        &[("c1:6379", 1), ("c2:6379", 1), ("c3:6379", 1)],
    );
    let manager = BackendManager::new(&config);

    let keys: Vec<String> = (0..200).map(|i| format!("session-{}", i)).collect();
    let before: Vec<String> = keys
        .iter()
        .map(|k| manager.select("cache", Some(k)).unwrap())
        .collect();

    manager.remove_server("cache", "c2:6379").unwrap();

    for (key, old) in keys.iter().zip(&before) {
        let now = manager.select("cache", Some(key)).unwrap();
        assert_ne!(now, "c2:6379");
        if old != "c2:6379" {
            assert_eq!(&now, old, "key {} moved off a surviving backend", key);
        }
    }
}

#[test]
fn test_empty_group_fails_selection() {
    let manager = BackendManager::new(
        &parse_config(
            r#"
            [[groups]]
            name = "web"
            strategy = "weighted-round-robin"

            [[groups.backends]]
            address = "w1:80"
            weight = 2
            "#,
        )
        .unwrap(),
    );

    manager.remove_server("web", "w1:80").unwrap();
    let err = manager.call("web", None, |_| Ok::<_, &str>(())).unwrap_err();
    assert!(matches!(
        err,
        DispatchError::Pool(PoolError::Select {
            source: SelectError::NoBackendAvailable,
            ..
        })
    ));
    assert_eq!(err.to_string(), "backend group 'web': no backend available");
}

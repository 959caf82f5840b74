use autopiloot_limiter::config::SETTINGS_ENV_VAR;
use autopiloot_limiter::{global, install_global, with_plugin_limit, PluginLimiters, LimitsConfig};
use std::io::Write;
use std::sync::{Arc, Barrier};
use std::thread;

// Only test in this binary: it owns the process environment and the global.
#[test]
fn global_is_built_once_from_settings() {
    let mut file = tempfile::Builder::new().suffix(".yaml").tempfile().unwrap();
    file.write_all(b"rapidapi:\n  plugins:\n    hubspot:\n      limits:\n        monthly: 2\n        per_minute: 600\n        burst: 5\n")
        .unwrap();
    std::env::set_var(SETTINGS_ENV_VAR, file.path());

    let barrier = Arc::new(Barrier::new(8));
    let handles: Vec<_> = (0..8)
        .map(|_| {
            let barrier = Arc::clone(&barrier);
            thread::spawn(move || {
                barrier.wait();
                global()
            })
        })
        .collect();
    let registries: Vec<Arc<PluginLimiters>> = handles.into_iter().map(|h| h.join().unwrap()).collect();

    for registry in &registries[1..] {
        assert!(Arc::ptr_eq(&registries[0], registry));
    }
    assert!(Arc::ptr_eq(&registries[0], &global()));
    assert_eq!(global().plugins(), vec!["hubspot"]);

    // The decorator goes through the same instance.
    let guard = with_plugin_limit("hubspot");
    assert_eq!(guard.call(|| 1).unwrap(), 1);
    assert_eq!(global().monthly_remaining("hubspot"), 1);

    // Too late to replace it.
    let replacement = Arc::new(PluginLimiters::new(&LimitsConfig::default()).unwrap());
    assert!(install_global(replacement).is_err());
}

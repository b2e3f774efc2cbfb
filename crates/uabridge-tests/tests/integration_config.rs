// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! # Config Integration Tests
//!
//! File loading in every format, the settings handed to the controller,
//! and a file edit travelling through the watcher into a server restart.

use std::fs::{self, File};
use std::path::Path;
use std::sync::Arc;
use std::time::{Duration, SystemTime};

use uabridge_bin::{supervise, LoopExit, LoopInputs, ShutdownCoordinator, ShutdownReason};
use uabridge_config::{ConfigLoader, ConfigWatcher, LogFormat, LogLevel};
use uabridge_core::{
    DeviceClass, LifecycleController, MemoryServerFactory, ModelServer, UnresolvedPolicy,
};
use uabridge_tests::prelude::*;

fn write(path: &Path, content: &str, age: Duration) {
    fs::write(path, content).unwrap();
    let stamp = SystemTime::now() - age;
    File::options()
        .write(true)
        .open(path)
        .unwrap()
        .set_modified(stamp)
        .unwrap();
}

fn loader(tag: &str) -> ConfigLoader {
    ConfigLoader::new().with_env_prefix(format!("UABRIDGE_IT_{}", tag))
}

#[test]
fn test_formats_are_equivalent() {
    let dir = temp_test_dir("uabridge-formats");
    let loader = loader("FORMATS");

    let files = [
        ("bridge.yaml", ConfigFixtures::full_yaml(4841)),
        ("bridge.toml", ConfigFixtures::full_toml(4841)),
        ("bridge.json", ConfigFixtures::full_json(4841)),
    ];

    let configs: Vec<_> = files
        .iter()
        .map(|(name, content)| {
            let path = dir.path().join(name);
            fs::write(&path, content).unwrap();
            loader.load(&path).unwrap()
        })
        .collect();

    assert_eq!(configs[0], configs[1]);
    assert_eq!(configs[1], configs[2]);

    let config = &configs[0];
    assert_eq!(config.server.port, 4841);
    assert_eq!(config.server.host, "127.0.0.1");
    assert_eq!(config.server.application_name, "opcuaserver");
    assert_eq!(config.bus.temperature.change_threshold, 0.5);
    assert_eq!(config.dispatch.unresolved, UnresolvedPolicy::Abort);
    assert_eq!(config.dispatch.event_queue, 64);
    assert_eq!(config.logging.level, LogLevel::Debug);
    assert_eq!(config.logging.format, LogFormat::Json);
    assert_eq!(config.watch.poll_interval(), Duration::from_millis(200));
}

#[test]
fn test_out_of_range_port_loads() {
    let dir = temp_test_dir("uabridge-port");
    let path = dir.path().join("bridge.yaml");
    fs::write(&path, ConfigFixtures::port_only_yaml(80)).unwrap();

    let config = loader("PORT").load(&path).unwrap();
    assert_eq!(config.server.port, 80);
    assert!(uabridge_core::validate_port(config.server.port).is_err());
}

#[tokio::test]
async fn test_config_drives_controller() {
    let config = loader("DRIVES")
        .load_from_str(&ConfigFixtures::full_json(4841), uabridge_config::ConfigFormat::Json)
        .unwrap();

    let factory = Arc::new(MemoryServerFactory::recording());
    let bus = Arc::new(MockDeviceBus::new(vec![20.0], vec![false]));
    let mut controller =
        LifecycleController::new(factory.clone(), bus.clone(), config.lifecycle_config());

    controller.launch(config.server.port).await.unwrap();

    assert_eq!(controller.dispatcher().policy(), UnresolvedPolicy::Abort);
    assert_eq!(factory.latest().unwrap().port(), 4841);
    let sub = bus.subscriptions()[0];
    assert_eq!(sub.class, DeviceClass::Temperature);
    assert_eq!(sub.options.temperature_threshold, 0.5);

    controller.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_file_edit_restarts_server() {
    init_test_logging();
    let dir = temp_test_dir("uabridge-watch");
    let path = dir.path().join("bridge.yaml");
    write(&path, &ConfigFixtures::port_only_yaml(4840), Duration::from_secs(60));

    let loader = loader("WATCH");
    let config = loader.load(&path).unwrap();

    let factory = Arc::new(MemoryServerFactory::recording());
    let bus = Arc::new(MockDeviceBus::new(vec![20.0, 21.0], vec![true]));
    let mut controller = LifecycleController::new(factory.clone(), bus, config.lifecycle_config());
    controller.launch(config.server.port).await.unwrap();

    let (changes, watcher) = ConfigWatcher::new(&path, loader, config)
        .with_interval(Duration::from_millis(20))
        .spawn(4);

    let coordinator = ShutdownCoordinator::new();
    let mut inputs = LoopInputs {
        shutdown: coordinator.subscribe(),
        signals: None,
        changes: Some(changes),
    };
    let task = tokio::spawn(async move {
        let exit = supervise(&mut controller, &mut inputs).await;
        (controller, exit)
    });

    write(&path, &ConfigFixtures::port_only_yaml(4843), Duration::ZERO);
    assert!(
        eventually(Duration::from_secs(3), || {
            factory.latest().map_or(false, |s| s.port() == 4843 && s.is_running())
        })
        .await
    );

    coordinator.initiate(ShutdownReason::Requested);
    let (mut controller, exit) = task.await.unwrap();
    watcher.stop().await;

    assert!(matches!(exit, LoopExit::Shutdown(ShutdownReason::Requested)));
    assert_eq!(controller.port(), Some(4843));
    assert_eq!(controller.registries().size(DeviceClass::Temperature), Some(2));
    assert!(!factory.created()[0].is_running());
    controller.shutdown().await.unwrap();
}

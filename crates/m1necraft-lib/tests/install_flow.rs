mod common;

use common::{installed_bundles_env, JAVA_EXE};
use m1necraft_lib::{EngineError, EngineEvent, InstallOutcome, InstallState, InstallStep};
use std::sync::{Arc, Mutex};

#[tokio::test]
async fn install_into_empty_host_directory() {
    let env = installed_bundles_env(&["1.16.5", "1.18.1"]);
    let engine = &env.engine;
    let host = env.host_dir();

    assert!(!engine.needs_setup());
    assert_eq!(engine.probe_state("1.16.5"), InstallState::NotInstalled);

    let outcome = engine.install("1.16.5").await.unwrap();
    let version_dir = host.join("versions/1.16.5-arm");
    assert_eq!(outcome, InstallOutcome::Installed(version_dir.clone()));
    assert_eq!(engine.probe_state("1.16.5"), InstallState::Installed(version_dir.clone()));

    assert!(version_dir.join("1.16.5-arm.json").is_file());
    assert!(host.join("libraries/lwjglnatives/liblwjgl.dylib").is_file());
    assert_eq!(std::fs::read(host.join("libraries/lwjglfat.jar")).unwrap(), b"fatjar");
    assert!(host.join("runtime/m1necraft-java-8").join(JAVA_EXE).is_file());
    assert!(!host.join("runtime/m1necraft-java-17").exists());
    assert!(!host.join(".m1necraft-staging").exists());

    let profiles = env.profiles_json();
    let profile = &profiles["profiles"]["m1necraft-1.16.5"];
    assert_eq!(profile["lastVersionId"], "1.16.5-arm");
    assert_eq!(profile["name"], "M1necraft");
    assert_eq!(profile["icon"], "Grass");
    assert_eq!(profile["type"], "custom");
    assert_eq!(
        profile["javaDir"],
        host.join("runtime/m1necraft-java-8")
            .join(JAVA_EXE)
            .to_string_lossy()
            .into_owned()
    );
    assert!(profile.get("lastUsed").is_none());
    assert_eq!(profiles["version"], 3);

    assert!(engine.termination_signal().allows_termination());
}

#[tokio::test]
async fn newer_versions_use_java_17() {
    let env = installed_bundles_env(&["1.18.1"]);
    env.engine.install("1.18.1").await.unwrap();

    let host = env.host_dir();
    assert!(host.join("runtime/m1necraft-java-17").join(JAVA_EXE).is_file());
    let profiles = env.profiles_json();
    assert!(profiles["profiles"]["m1necraft-1.18.1"]["javaDir"]
        .as_str()
        .unwrap()
        .contains("m1necraft-java-17"));
}

#[tokio::test]
async fn probe_state_follows_the_filesystem() {
    let env = installed_bundles_env(&["1.16.5"]);
    let dir = env.host_dir().join("versions/1.16.5-arm");

    std::fs::create_dir_all(&dir).unwrap();
    assert!(env.engine.probe_state("1.16.5").is_installed());
    std::fs::remove_dir_all(&dir).unwrap();
    assert_eq!(env.engine.probe_state("1.16.5"), InstallState::NotInstalled);
}

#[tokio::test]
async fn profile_step_is_idempotent_across_reinstalls() {
    let env = installed_bundles_env(&["1.16.5"]);
    env.engine.install("1.16.5").await.unwrap();
    let first = env.profiles_json();

    std::fs::remove_dir_all(env.host_dir().join("versions/1.16.5-arm")).unwrap();
    let outcome = env.engine.install("1.16.5").await.unwrap();
    assert!(matches!(outcome, InstallOutcome::Installed(_)));

    let second = env.profiles_json();
    assert_eq!(first, second);
    let owned = second["profiles"]
        .as_object()
        .unwrap()
        .keys()
        .filter(|k| k.starts_with("m1necraft-"))
        .count();
    assert_eq!(owned, 1);
}

#[tokio::test]
async fn concurrent_installs_of_one_version_run_once() {
    let env = installed_bundles_env(&["1.16.5"]);
    let steps_a = Arc::new(Mutex::new(Vec::new()));
    let steps_b = Arc::new(Mutex::new(Vec::new()));

    let (a, b) = tokio::join!(
        env.engine.install_with("1.16.5", {
            let steps = steps_a.clone();
            move |step| steps.lock().unwrap().push(step)
        }),
        env.engine.install_with("1.16.5", {
            let steps = steps_b.clone();
            move |step| steps.lock().unwrap().push(step)
        }),
    );

    assert!(matches!(a.unwrap(), InstallOutcome::Installed(_)));
    assert_eq!(b.unwrap(), InstallOutcome::AlreadyInProgress);
    assert_eq!(*steps_a.lock().unwrap(), InstallStep::ALL.to_vec());
    assert!(steps_b.lock().unwrap().is_empty());
}

#[tokio::test]
async fn concurrent_installs_of_different_versions_both_land() {
    let env = installed_bundles_env(&["1.16.5", "1.18.1"]);

    let (a, b) = tokio::join!(env.engine.install("1.16.5"), env.engine.install("1.18.1"));
    assert!(matches!(a.unwrap(), InstallOutcome::Installed(_)));
    assert!(matches!(b.unwrap(), InstallOutcome::Installed(_)));

    let host = env.host_dir();
    assert!(env.engine.probe_state("1.16.5").is_installed());
    assert!(env.engine.probe_state("1.18.1").is_installed());
    assert!(host.join("libraries/lwjglnatives/liblwjgl.dylib").is_file());
    assert_eq!(std::fs::read(host.join("libraries/lwjglfat.jar")).unwrap(), b"fatjar");
    assert!(host.join("runtime/m1necraft-java-8").join(JAVA_EXE).is_file());
    assert!(host.join("runtime/m1necraft-java-17").join(JAVA_EXE).is_file());
    assert!(!host.join(".m1necraft-staging").exists());

    let profiles = env.profiles_json();
    assert!(profiles["profiles"].get("m1necraft-1.16.5").is_some());
    assert!(profiles["profiles"].get("m1necraft-1.18.1").is_some());
}

#[tokio::test]
async fn failed_sibling_install_keeps_shared_files() {
    let env = installed_bundles_env(&["1.16.5", "1.18.1"]);
    let host = env.host_dir();
    let profiles = host.join("launcher_profiles.json");
    let saved = host.join("launcher_profiles.saved");

    // 1.16.5 finds an unreadable profile file at its profile step;
    // 1.18.1 restores the real one before its own, whichever runs first.
    let (a, b) = tokio::join!(
        env.engine.install_with("1.16.5", {
            let (profiles, saved) = (profiles.clone(), saved.clone());
            move |step| {
                if step == InstallStep::AddingProfile {
                    std::fs::copy(&profiles, &saved).unwrap();
                    std::fs::write(&profiles, b"not json").unwrap();
                }
            }
        }),
        env.engine.install_with("1.18.1", {
            let (profiles, saved) = (profiles.clone(), saved.clone());
            move |step| {
                if step == InstallStep::AddingProfile && saved.exists() {
                    std::fs::rename(&saved, &profiles).unwrap();
                }
            }
        }),
    );
    if saved.exists() {
        std::fs::rename(&saved, &profiles).unwrap();
    }

    assert!(matches!(a.unwrap_err(), EngineError::ProfileDecode { .. }));
    assert!(matches!(b.unwrap(), InstallOutcome::Installed(_)));

    assert_eq!(env.engine.probe_state("1.16.5"), InstallState::NotInstalled);
    assert!(env.engine.probe_state("1.18.1").is_installed());
    assert!(host.join("libraries/lwjglnatives/liblwjgl.dylib").is_file());
    assert_eq!(std::fs::read(host.join("libraries/lwjglfat.jar")).unwrap(), b"fatjar");
    assert!(host.join("runtime/m1necraft-java-17").join(JAVA_EXE).is_file());
    assert!(!host.join("runtime/m1necraft-java-8").exists());
    assert!(!host.join(".m1necraft-staging").exists());

    let doc = env.profiles_json();
    assert!(doc["profiles"].get("m1necraft-1.18.1").is_some());
    assert!(doc["profiles"].get("m1necraft-1.16.5").is_none());
    assert!(env.engine.termination_signal().allows_termination());
}

#[tokio::test]
async fn installed_version_is_not_reinstalled() {
    let env = installed_bundles_env(&["1.16.5"]);
    env.engine.install("1.16.5").await.unwrap();

    let steps = Arc::new(Mutex::new(Vec::new()));
    let outcome = env
        .engine
        .install_with("1.16.5", {
            let steps = steps.clone();
            move |step| steps.lock().unwrap().push(step)
        })
        .await
        .unwrap();
    assert!(matches!(outcome, InstallOutcome::AlreadyInstalled(_)));
    assert!(steps.lock().unwrap().is_empty());
}

#[tokio::test]
async fn failed_profile_step_rolls_back_copies() {
    let env = installed_bundles_env(&["1.16.5"]);
    let host = env.host_dir();
    std::fs::create_dir_all(host.join("versions")).unwrap();
    std::fs::create_dir_all(host.join("libraries")).unwrap();
    std::fs::write(host.join("libraries/lwjglfat.jar"), b"previous").unwrap();
    std::fs::write(host.join("launcher_profiles.json"), b"{ not json").unwrap();

    let err = env.engine.install("1.16.5").await.unwrap_err();
    assert!(matches!(err, EngineError::ProfileDecode { .. }));

    assert_eq!(env.engine.probe_state("1.16.5"), InstallState::NotInstalled);
    assert_eq!(std::fs::read(host.join("libraries/lwjglfat.jar")).unwrap(), b"previous");
    assert!(!host.join("libraries/lwjglnatives").exists());
    assert!(!host.join("runtime/m1necraft-java-8").exists());
    assert!(env.engine.termination_signal().allows_termination());
}

#[tokio::test]
async fn unknown_version_is_rejected() {
    let env = installed_bundles_env(&["1.16.5"]);
    let err = env.engine.install("1.12.2").await.unwrap_err();
    assert!(matches!(err, EngineError::UnknownVersion(name) if name == "1.12.2"));
}

#[tokio::test]
async fn versions_are_listed_newest_first_with_state() {
    let env = installed_bundles_env(&["1.16.5", "1.18.1", "1.17"]);
    env.engine.install("1.17").await.unwrap();

    let versions = env.engine.versions().unwrap();
    let names: Vec<&str> = versions.iter().map(|v| v.name.as_str()).collect();
    assert_eq!(names, ["1.18.1", "1.17", "1.16.5"]);
    assert!(versions[1].state.is_installed());
    assert_eq!(versions[0].state, InstallState::NotInstalled);
}

#[tokio::test]
async fn install_publishes_steps_and_final_state() {
    let env = installed_bundles_env(&["1.16.5"]);
    let mut events = env.engine.subscribe();

    env.engine.install("1.16.5").await.unwrap();

    let mut steps = Vec::new();
    let mut last_state = None;
    while let Ok(event) = events.try_recv() {
        match event {
            EngineEvent::StepStarted { version, step } => {
                assert_eq!(version, "1.16.5");
                steps.push(step);
            }
            EngineEvent::StateChanged { state, .. } => last_state = Some(state),
        }
    }
    assert_eq!(steps, InstallStep::ALL.to_vec());
    assert!(matches!(last_state, Some(InstallState::Installed(_))));
}

#[tokio::test]
async fn reset_removes_only_owned_state() {
    let env = installed_bundles_env(&["1.16.5", "1.18.1"]);
    env.engine.install("1.16.5").await.unwrap();
    env.engine.install("1.18.1").await.unwrap();

    let host = env.host_dir();
    std::fs::create_dir_all(host.join("versions/1.19.2")).unwrap();
    let mut profiles = env.profiles_json();
    profiles["profiles"]["vanilla"] = serde_json::json!({
        "lastVersionId": "1.19.2",
        "type": "custom",
        "name": "Vanilla"
    });
    std::fs::write(
        host.join("launcher_profiles.json"),
        serde_json::to_vec_pretty(&profiles).unwrap(),
    )
    .unwrap();

    env.engine.reset().await.unwrap();

    let after = env.profiles_json();
    let keys: Vec<&String> = after["profiles"].as_object().unwrap().keys().collect();
    assert_eq!(keys, ["vanilla"]);
    assert!(!host.join("versions/1.16.5-arm").exists());
    assert!(!host.join("versions/1.18.1-arm").exists());
    assert!(host.join("versions/1.19.2").is_dir());

    let data = env.data_dir();
    assert!(data.is_dir());
    assert_eq!(std::fs::read_dir(&data).unwrap().count(), 0);
    assert!(env.engine.needs_setup());
    assert!(env.engine.termination_signal().allows_termination());
}

#[tokio::test]
async fn reset_removes_installs_without_profiles_bundle() {
    let env = installed_bundles_env(&["1.16.5"]);
    env.engine.install("1.16.5").await.unwrap();
    std::fs::remove_dir_all(env.data_dir().join("mcl_profiles")).unwrap();

    env.engine.reset().await.unwrap();

    assert!(!env.host_dir().join("versions/1.16.5-arm").exists());
    let profiles = env.profiles_json();
    assert_eq!(profiles["profiles"].as_object().unwrap().len(), 0);
}

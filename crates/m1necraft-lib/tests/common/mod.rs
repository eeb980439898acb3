#![allow(dead_code)]

use m1necraft_lib::config::ResourceConfig;
use m1necraft_lib::core::FetchOptions;
use m1necraft_lib::{Engine, PathLayout};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tempfile::TempDir;
use zip::write::SimpleFileOptions;

pub const JAVA_EXE: &str = "Contents/Home/bin/java";

pub struct TestEnv {
    pub tmp: TempDir,
    pub engine: Engine,
}

impl TestEnv {
    pub fn data_dir(&self) -> PathBuf {
        self.tmp.path().join("data")
    }

    pub fn host_dir(&self) -> PathBuf {
        self.tmp.path().join("minecraft")
    }

    pub fn profiles_json(&self) -> serde_json::Value {
        let raw = std::fs::read(self.host_dir().join("launcher_profiles.json")).unwrap();
        serde_json::from_slice(&raw).unwrap()
    }
}

pub fn fast_config(base: &str) -> ResourceConfig {
    ResourceConfig {
        fetch: FetchOptions {
            attempts: 1,
            retry_delay: Duration::from_millis(1),
        },
        request_timeout: Duration::from_secs(10),
        ..ResourceConfig::with_base(base)
    }
}

/// Engine over an empty host dir, pointed at `base` for remote resources
pub fn engine_env(base: &str) -> TestEnv {
    let tmp = TempDir::new().expect("tmpdir");
    let layout =
        PathLayout::new(tmp.path().join("data"), tmp.path().join("minecraft")).expect("layout");
    let engine = Engine::new(layout, fast_config(base)).expect("engine");
    TestEnv { tmp, engine }
}

/// Engine with every bundle already extracted in the data dir
pub fn installed_bundles_env(versions: &[&str]) -> TestEnv {
    let env = engine_env("http://127.0.0.1:9");
    write_local_bundles(&env.data_dir(), versions);
    env
}

pub fn write_local_bundles(data_dir: &Path, versions: &[&str]) {
    let natives = data_dir.join("lwjgl/lwjglnatives");
    std::fs::create_dir_all(&natives).unwrap();
    std::fs::write(natives.join("liblwjgl.dylib"), b"native").unwrap();
    std::fs::write(data_dir.join("lwjgl/lwjglfat.jar"), b"fatjar").unwrap();

    for version in versions {
        let template = data_dir.join(format!("mcl_profiles/{version}-arm"));
        std::fs::create_dir_all(&template).unwrap();
        std::fs::write(
            template.join(format!("{version}-arm.json")),
            format!(r#"{{"id":"{version}-arm"}}"#),
        )
        .unwrap();
    }

    for major in [8, 17] {
        let bin = data_dir.join(format!("java-{major}/zulu-{major}.jre/Contents/Home/bin"));
        std::fs::create_dir_all(&bin).unwrap();
        std::fs::write(bin.join("java"), b"#!/bin/sh\n").unwrap();
    }
}

/// Zip archive bytes from (name, contents) pairs
pub fn zip_bytes(files: &[(&str, &[u8])]) -> Vec<u8> {
    let mut zip = zip::ZipWriter::new(std::io::Cursor::new(Vec::new()));
    for (name, data) in files {
        zip.start_file(*name, SimpleFileOptions::default().unix_permissions(0o644))
            .unwrap();
        zip.write_all(data).unwrap();
    }
    zip.finish().unwrap().into_inner()
}

pub fn profiles_zip() -> Vec<u8> {
    zip_bytes(&[
        ("1.16.5-arm/1.16.5-arm.json", b"{}"),
        ("1.18.1-arm/1.18.1-arm.json", b"{}"),
        ("__MACOSX/._1.16.5-arm", b""),
    ])
}

pub fn lwjgl_zip() -> Vec<u8> {
    zip_bytes(&[
        ("lwjglnatives/liblwjgl.dylib", b"native"),
        ("lwjglfat.jar", b"fatjar"),
    ])
}

pub fn java_zip(major: u32) -> Vec<u8> {
    let exe = format!("zulu-{major}.jre/{JAVA_EXE}");
    let tool = format!("zulu-{major}.jre/Contents/Home/bin/keytool");
    zip_bytes(&[(exe.as_str(), b"#!/bin/sh\n"), (tool.as_str(), b"#!/bin/sh\n")])
}

pub fn metadata_json(published_at: &str) -> serde_json::Value {
    serde_json::json!({
        "tag_name": "resources",
        "name": "Resources",
        "published_at": published_at,
        "assets": []
    })
}

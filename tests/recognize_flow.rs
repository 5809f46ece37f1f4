use absensi::api::{self, Status};
use absensi::config::{self, Config};
use absensi::directory::FileDirectory;
use absensi::storage::{FaceStore, PostcardStore};
use anyhow::Result;
use std::sync::atomic::{AtomicBool, Ordering};
use tempfile::TempDir;

fn setup(tmp: &TempDir) -> Result<Config> {
    let cfg = Config {
        threshold: 0.6,
        directory: tmp.path().join("users.json"),
        store_prefix: tmp.path().join("faces"),
    };
    let users = serde_json::json!([
        {"id": "7", "nama": "Rina", "role": "siswa", "nisn": "0099887766", "embedding": null},
        {"id": "8", "nama": "Pak Joko", "role": "guru", "nisn": null, "embedding": [0.9, 0.1, 0.0]}
    ]);
    std::fs::write(&cfg.directory, serde_json::to_string(&users)?)?;
    config::save_config(&cfg, Some(tmp.path().join("config.toml").as_path()))?;
    Ok(cfg)
}

#[test]
fn test_enroll_then_recognize() -> Result<()> {
    let tmp = TempDir::new()?;
    setup(&tmp)?;
    let cfg = config::load_config(Some(tmp.path().join("config.toml").as_path()))?;
    let store = PostcardStore::new(&cfg.store_prefix);

    // Before enrollment Rina has no face, only Pak Joko is a candidate.
    let directory = FileDirectory::new(&cfg.directory, store.clone());
    let resp = api::recognize(r#"{"face_embedding":[0.1,0.2,0.3]}"#, &directory, cfg.threshold);
    assert_eq!(resp.status, Status::Ok);
    assert_eq!(resp.body["message"], "face not recognized");

    let resp = api::enroll(
        r#"{"user_id":"7","face_embedding":[0.1,0.2,0.3]}"#,
        &store,
    );
    assert_eq!(resp.status, Status::Ok);
    assert_eq!(resp.body["success"], true);
    let stored = store.load("7")?;
    assert_eq!(stored.len(), 1);
    assert_eq!(resp.body["id"], stored[0].id.as_str());
    assert!(resp.body.get("user_id").is_none());

    let resp = api::recognize(r#"{"face_embedding":[0.1,0.2,0.3]}"#, &directory, cfg.threshold);
    assert_eq!(resp.status, Status::Ok);
    assert_eq!(resp.body["success"], true);
    assert_eq!(resp.body["match"]["id"], "7");
    assert_eq!(resp.body["match"]["nama"], "Rina");
    assert_eq!(resp.body["match"]["nisn"], "0099887766");
    assert_eq!(resp.body["match"]["confidence"], 1.0);

    let resp = api::recognize(r#"{"face_embedding":[0.85,0.1,0.0]}"#, &directory, cfg.threshold);
    assert_eq!(resp.body["match"]["id"], "8");
    assert!(resp.body["match"]["nisn"].is_null());
    Ok(())
}

#[test]
fn test_no_enrolled_faces() -> Result<()> {
    let tmp = TempDir::new()?;
    let cfg = Config {
        directory: tmp.path().join("users.json"),
        store_prefix: tmp.path().join("faces"),
        ..Config::default()
    };
    std::fs::write(
        &cfg.directory,
        r#"[{"id":"1","nama":"Dewi","role":"siswa"}]"#,
    )?;
    let directory = FileDirectory::new(&cfg.directory, PostcardStore::new(&cfg.store_prefix));
    let resp = api::recognize(r#"{"face_embedding":[0.0,0.0]}"#, &directory, cfg.threshold);
    assert_eq!(resp.status, Status::Ok);
    assert_eq!(resp.body["message"], "no enrolled faces");
    Ok(())
}

#[test]
fn test_corrupt_enrollment_is_server_error() -> Result<()> {
    let tmp = TempDir::new()?;
    let cfg = setup(&tmp)?;
    let store = PostcardStore::new(&cfg.store_prefix);
    // Pak Joko's inline embedding has 3 values; a 2-value probe hits it.
    let directory = FileDirectory::new(&cfg.directory, store);
    let resp = api::recognize(r#"{"face_embedding":[0.9,0.1]}"#, &directory, cfg.threshold);
    assert_eq!(resp.status, Status::ServerError);
    assert_eq!(resp.body["success"], false);
    Ok(())
}

#[test]
fn test_enroll_rejects_bad_requests() -> Result<()> {
    let tmp = TempDir::new()?;
    let store = PostcardStore::new(tmp.path());
    for body in [
        r#"{"face_embedding":[0.1]}"#,
        r#"{"user_id":"  ","face_embedding":[0.1]}"#,
        r#"{"user_id":"1"}"#,
        r#"{"user_id":"1","face_embedding":[]}"#,
        r#"{"user_id":"1","face_embedding":{"a":1}}"#,
    ] {
        let resp = api::enroll(body, &store);
        assert_eq!(resp.status, Status::ClientError, "body {body}");
    }
    assert!(store.load("1")?.is_empty());

    let resp = api::enroll(r#"{"user_id":"../x","face_embedding":[0.1]}"#, &store);
    assert_eq!(resp.status, Status::ClientError);
    Ok(())
}

#[test]
fn test_recognize_while_enrolling() -> Result<()> {
    let tmp = TempDir::new()?;
    let cfg = setup(&tmp)?;
    let store = PostcardStore::new(&cfg.store_prefix);
    let directory = FileDirectory::new(&cfg.directory, store.clone());

    // Large embeddings make each faces.bin rewrite span many writes.
    let dim = 20_000;
    let mut probe = vec![0.0f32; dim];
    probe[0] = 0.01;
    let probe_body = serde_json::json!({ "face_embedding": probe }).to_string();
    let enroll_body = serde_json::json!({ "user_id": "7", "face_embedding": vec![0.0f32; dim] })
        .to_string();

    // Pak Joko's inline 3-value embedding would clash with the long probe.
    std::fs::write(
        &cfg.directory,
        r#"[{"id":"7","nama":"Rina","role":"siswa","nisn":"0099887766"}]"#,
    )?;

    let done = AtomicBool::new(false);
    let (enrolled, server_errors) = std::thread::scope(|s| {
        let writer = s.spawn(|| {
            let responses: Vec<_> = (0..40)
                .map(|_| api::enroll(&enroll_body, &store))
                .collect();
            done.store(true, Ordering::SeqCst);
            responses
        });

        let readers: Vec<_> = (0..2)
            .map(|_| {
                s.spawn(|| {
                    let mut errors = 0;
                    while !done.load(Ordering::SeqCst) {
                        let resp = api::recognize(&probe_body, &directory, cfg.threshold);
                        if resp.status == Status::ServerError {
                            errors += 1;
                        }
                    }
                    errors
                })
            })
            .collect();

        let enrolled = writer.join().unwrap();
        let errors: usize = readers.into_iter().map(|r| r.join().unwrap()).sum();
        (enrolled, errors)
    });

    assert_eq!(server_errors, 0);
    let enrolled: Vec<String> = enrolled
        .iter()
        .map(|resp| {
            assert_eq!(resp.status, Status::Ok, "{}", resp.body);
            resp.body["id"].as_str().unwrap_or_default().to_string()
        })
        .collect();
    let stored = store.load("7")?;
    assert_eq!(stored.len(), enrolled.len());
    for id in &enrolled {
        assert!(stored.iter().any(|r| &r.id == id), "record {id} missing");
    }

    let resp = api::recognize(&probe_body, &directory, cfg.threshold);
    assert_eq!(resp.body["match"]["id"], "7");
    Ok(())
}

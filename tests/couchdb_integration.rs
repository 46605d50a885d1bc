//! Integration tests of the CouchDB backend against a fake HTTP server.
//!
//! The fake answers each request on its own connection (`Connection:
//! close`) from a routing closure and records what it received, so tests
//! can assert on both the client's results and the requests it sent.

use std::io::{Read, Write};
use std::net::{TcpListener, TcpStream};
use std::sync::{Arc, Mutex};
use std::thread;

use serde_json::{json, Value};
use tempfile::TempDir;

use object_recognition_db::config::CouchDbConfig;
use object_recognition_db::db::create_or_get;
use object_recognition_db::mesh::{upload_mesh, MeshUpload};
use object_recognition_db::object_ids::interpret_object_ids;
use object_recognition_db::store::couchdb::CouchServer;
use object_recognition_db::store::{selector, Database, Document, DocumentServer};

#[derive(Debug, Clone)]
struct Recorded {
    method: String,
    target: String,
    body: String,
}

impl Recorded {
    fn json(&self) -> Value {
        serde_json::from_str(&self.body).unwrap()
    }
}

struct FakeCouch {
    root: String,
    requests: Arc<Mutex<Vec<Recorded>>>,
}

impl FakeCouch {
    fn start<F>(handler: F) -> Self
    where
        F: Fn(&Recorded) -> (u16, String) + Send + 'static,
    {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let root = format!("http://{}", listener.local_addr().unwrap());
        let requests = Arc::new(Mutex::new(Vec::new()));
        let log = Arc::clone(&requests);

        thread::spawn(move || {
            for stream in listener.incoming() {
                let Ok(mut stream) = stream else { break };
                let Some(request) = read_request(&mut stream) else {
                    continue;
                };
                let (status, body) = handler(&request);
                let head_only = request.method == "HEAD";
                log.lock().unwrap().push(request);
                write_response(&mut stream, status, &body, head_only);
            }
        });

        Self { root, requests }
    }

    fn requests(&self) -> Vec<Recorded> {
        self.requests.lock().unwrap().clone()
    }

    fn server(&self) -> CouchServer {
        CouchServer::new(&self.root, &CouchDbConfig::default()).unwrap()
    }
}

fn read_request(stream: &mut TcpStream) -> Option<Recorded> {
    let mut buf = Vec::new();
    let mut chunk = [0u8; 8192];
    let header_end = loop {
        if let Some(pos) = buf.windows(4).position(|w| w == b"\r\n\r\n") {
            break pos + 4;
        }
        let n = stream.read(&mut chunk).ok()?;
        if n == 0 {
            return None;
        }
        buf.extend_from_slice(&chunk[..n]);
    };

    let head = String::from_utf8_lossy(&buf[..header_end]).to_string();
    let mut lines = head.lines();
    let mut request_line = lines.next()?.split_whitespace();
    let method = request_line.next()?.to_string();
    let target = request_line.next()?.to_string();
    let content_length = lines
        .filter_map(|line| line.split_once(':'))
        .find(|(name, _)| name.trim().eq_ignore_ascii_case("content-length"))
        .and_then(|(_, value)| value.trim().parse::<usize>().ok())
        .unwrap_or(0);

    while buf.len() < header_end + content_length {
        let n = stream.read(&mut chunk).ok()?;
        if n == 0 {
            break;
        }
        buf.extend_from_slice(&chunk[..n]);
    }
    let end = (header_end + content_length).min(buf.len());
    let body = String::from_utf8_lossy(&buf[header_end..end]).to_string();

    Some(Recorded {
        method,
        target,
        body,
    })
}

fn write_response(stream: &mut TcpStream, status: u16, body: &str, head_only: bool) {
    let reason = match status {
        200 => "OK",
        201 => "Created",
        404 => "Not Found",
        409 => "Conflict",
        412 => "Precondition Failed",
        _ => "Unknown",
    };
    let head = format!(
        "HTTP/1.1 {} {}\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n",
        status,
        reason,
        if head_only { 0 } else { body.len() }
    );
    let _ = stream.write_all(head.as_bytes());
    if !head_only {
        let _ = stream.write_all(body.as_bytes());
    }
    let _ = stream.flush();
}

fn object_page(range: std::ops::Range<usize>, bookmark: &str) -> String {
    let docs: Vec<Value> = range
        .map(|i| json!({"_id": format!("o{:04}", i), "_rev": "1-a", "Type": "Object"}))
        .collect();
    json!({ "docs": docs, "bookmark": bookmark }).to_string()
}

#[test]
fn test_create_or_get_accepts_412_from_create() {
    let fake = FakeCouch::start(|req| match (req.method.as_str(), req.target.as_str()) {
        ("HEAD", "/objs") => (404, String::new()),
        ("PUT", "/objs") => (
            412,
            r#"{"error":"file_exists","reason":"The database could not be created, the file already exists."}"#
                .to_string(),
        ),
        _ => (500, r#"{"error":"unexpected"}"#.to_string()),
    });
    let server = fake.server();

    let db = create_or_get(&server, "objs").unwrap();
    assert_eq!(db.name(), "objs");

    let seen: Vec<(String, String)> = fake
        .requests()
        .into_iter()
        .map(|r| (r.method, r.target))
        .collect();
    assert_eq!(
        seen,
        vec![
            ("HEAD".to_string(), "/objs".to_string()),
            ("PUT".to_string(), "/objs".to_string()),
        ]
    );
}

#[test]
fn test_create_or_get_propagates_other_errors() {
    let fake = FakeCouch::start(|req| match req.method.as_str() {
        "HEAD" => (404, String::new()),
        _ => (
            401,
            r#"{"error":"unauthorized","reason":"You are not a server admin."}"#.to_string(),
        ),
    });
    let err = create_or_get(&fake.server(), "objs").err().unwrap();
    assert!(err.to_string().contains("unauthorized"), "got: {}", err);
}

#[test]
fn test_find_follows_bookmark_after_full_page() {
    let fake = FakeCouch::start(|req| {
        let body: Value = serde_json::from_str(&req.body).unwrap_or(Value::Null);
        match body.get("bookmark").and_then(Value::as_str) {
            None => (200, object_page(0..1000, "bm1")),
            Some("bm1") => (200, object_page(1000..1001, "bm2")),
            Some(_) => (500, r#"{"error":"unexpected"}"#.to_string()),
        }
    });
    let db = fake.server().database("objs").unwrap();

    let docs = db.find(&selector([("Type", json!("Object"))])).unwrap();
    assert_eq!(docs.len(), 1001);
    assert_eq!(docs[1000].id, "o1000");

    let requests = fake.requests();
    assert_eq!(requests.len(), 2);
    for req in &requests {
        assert_eq!(req.method, "POST");
        assert_eq!(req.target, "/objs/_find");
        assert_eq!(req.json()["selector"], json!({"Type": "Object"}));
        assert_eq!(req.json()["limit"], json!(1000));
    }
    assert!(requests[0].json().get("bookmark").is_none());
    assert_eq!(requests[1].json()["bookmark"], json!("bm1"));
}

#[test]
fn test_find_stops_on_short_page() {
    let fake = FakeCouch::start(|_| (200, object_page(0..3, "bm1")));
    let db = fake.server().database("objs").unwrap();
    let docs = db.find(&selector([("Type", json!("Object"))])).unwrap();
    assert_eq!(docs.len(), 3);
    assert_eq!(fake.requests().len(), 1);
}

#[test]
fn test_save_then_attachment_carries_rev() {
    let fake = FakeCouch::start(|req| match (req.method.as_str(), req.target.as_str()) {
        ("PUT", "/objs/m1") => (201, r#"{"ok":true,"id":"m1","rev":"1-a"}"#.to_string()),
        ("PUT", "/objs/m1/cloud.ply?rev=1-a") => {
            (201, r#"{"ok":true,"id":"m1","rev":"2-b"}"#.to_string())
        }
        _ => (409, r#"{"error":"conflict","reason":"Document update conflict."}"#.to_string()),
    });
    let db = fake.server().database("objs").unwrap();

    let mut doc = Document::new();
    doc.id = "m1".to_string();
    doc.set("Type", "Model");
    db.save(&mut doc).unwrap();
    assert_eq!(doc.rev.as_deref(), Some("1-a"));

    db.put_attachment(&mut doc, "cloud.ply", "application/octet-stream", b"ply".to_vec())
        .unwrap();
    assert_eq!(doc.rev.as_deref(), Some("2-b"));
    assert_eq!(doc.attachments["cloud.ply"].length, 3);

    let requests = fake.requests();
    assert_eq!(requests[0].json()["Type"], json!("Model"));
    assert!(requests[0].json().get("_rev").is_none());
    assert_eq!(requests[1].target, "/objs/m1/cloud.ply?rev=1-a");
    assert_eq!(requests[1].body, "ply");
}

#[test]
fn test_upload_mesh_updates_existing_model() {
    let tmp = TempDir::new().unwrap();
    let original = tmp.path().join("cup.ply");
    std::fs::write(&original, "ply\n").unwrap();

    let model = json!({
        "_id": "m1",
        "_rev": "1-a",
        "Type": "Model",
        "object_id": "obj1",
        "method": "mesh",
        "_attachments": {
            "mesh.stl": {"content_type": "application/octet-stream", "length": 4, "stub": true}
        }
    });
    let model_body = model.to_string();
    let fake = FakeCouch::start(move |req| match (req.method.as_str(), req.target.as_str()) {
        ("POST", "/objs/_find") => (
            200,
            json!({"docs": [model.clone()], "bookmark": "x"}).to_string(),
        ),
        ("GET", "/objs/m1") => (200, model_body.clone()),
        ("PUT", "/objs/m1") => (201, r#"{"ok":true,"id":"m1","rev":"2-b"}"#.to_string()),
        ("PUT", "/objs/m1/original.ply?rev=2-b") => {
            (201, r#"{"ok":true,"id":"m1","rev":"3-c"}"#.to_string())
        }
        _ => (409, r#"{"error":"conflict","reason":"Document update conflict."}"#.to_string()),
    });
    let db = fake.server().database("objs").unwrap();

    let report = upload_mesh(db.as_ref(), "obj1", &MeshUpload::new(&original, tmp.path())).unwrap();
    assert!(!report.created);
    assert_eq!(report.model_id, "m1");
    assert_eq!(report.attachments, vec!["original.ply"]);

    let requests = fake.requests();
    let find = requests.iter().find(|r| r.target == "/objs/_find").unwrap();
    assert_eq!(
        find.json()["selector"],
        json!({"Type": "Model", "object_id": "obj1", "method": "mesh"})
    );
    // The existing attachment stub goes back with the save so the server keeps it.
    let save = requests
        .iter()
        .find(|r| r.method == "PUT" && r.target == "/objs/m1")
        .unwrap();
    assert_eq!(save.json()["_rev"], json!("1-a"));
    assert_eq!(save.json()["_attachments"]["mesh.stl"]["stub"], json!(true));
    assert!(requests
        .iter()
        .any(|r| r.target == "/objs/m1/original.ply?rev=2-b"));
}

#[test]
fn test_interpret_all_against_couchdb() {
    let fake = FakeCouch::start(|req| match (req.method.as_str(), req.target.as_str()) {
        ("HEAD", "/objs") => (200, String::new()),
        ("POST", "/objs/_index") => (200, r#"{"result":"created"}"#.to_string()),
        ("POST", "/objs/_find") => (
            200,
            json!({"docs": [
                {"_id": "b", "_rev": "1-x", "Type": "Object", "object_name": "can"},
                {"_id": "a", "_rev": "1-y", "Type": "Object", "object_name": "cup"}
            ], "bookmark": "z"})
            .to_string(),
        ),
        _ => (500, r#"{"error":"unexpected"}"#.to_string()),
    });

    let params = json!({"type": "CouchDB", "root": fake.root, "collection": "objs"}).to_string();
    let ids = interpret_object_ids(&params, "all", "", &CouchDbConfig::default()).unwrap();
    assert_eq!(ids, vec!["a", "b"]);

    let requests = fake.requests();
    assert_eq!(
        requests
            .iter()
            .filter(|r| r.target == "/objs/_index")
            .count(),
        2
    );
    let find = requests.iter().find(|r| r.target == "/objs/_find").unwrap();
    assert_eq!(find.json()["selector"], json!({"Type": "Object"}));
}

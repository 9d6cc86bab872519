//! Transport tests: a one-shot local HTTP listener stands in for the webhook
//! and a shell script stands in for `mail`.

use std::io::{BufRead, BufReader, Read, Write};
use std::net::TcpListener;
use std::os::unix::fs::PermissionsExt;
use std::thread;

use storeops_core::{NotifyKind, NotifyTarget};
use storeops_notify::{Dispatcher, Notification, Notifier, Status};
use tempfile::TempDir;

fn webhook(url: String) -> NotifyTarget {
    NotifyTarget {
        kind: NotifyKind::Webhook,
        target: url,
    }
}

fn mailbox(address: &str) -> NotifyTarget {
    NotifyTarget {
        kind: NotifyKind::Mailbox,
        target: address.to_string(),
    }
}

/// Serve one request with `status_line`; returns (head, body) of the request.
fn serve_once(status_line: &'static str) -> (String, thread::JoinHandle<(String, String)>) {
    let listener = TcpListener::bind("127.0.0.1:0").expect("bind");
    let url = format!("http://{}/hook", listener.local_addr().expect("addr"));
    let handle = thread::spawn(move || {
        let (stream, _) = listener.accept().expect("accept");
        let mut reader = BufReader::new(stream.try_clone().expect("clone"));
        let mut head = String::new();
        let mut content_length = 0usize;
        loop {
            let mut line = String::new();
            reader.read_line(&mut line).expect("read header");
            if line == "\r\n" || line.is_empty() {
                break;
            }
            if let Some(value) = line.to_ascii_lowercase().strip_prefix("content-length:") {
                content_length = value.trim().parse().expect("length");
            }
            head.push_str(&line);
        }
        let mut body = vec![0u8; content_length];
        reader.read_exact(&mut body).expect("body");
        let mut stream = stream;
        write!(stream, "{status_line}\r\nContent-Length: 0\r\nConnection: close\r\n\r\n")
            .expect("respond");
        (head, String::from_utf8(body).expect("utf8 body"))
    });
    (url, handle)
}

#[test]
fn webhook_posts_json_with_user_agent() {
    let (url, server) = serve_once("HTTP/1.1 204 No Content");
    let dispatcher = Dispatcher::new(vec![webhook(url)], "nas").expect("dispatcher");
    let note = Notification::new("Sync completed", "sync", Status::Good, "3 files")
        .with_details("details here");

    assert!(dispatcher.send(&note));

    let (head, body) = server.join().expect("server thread");
    assert!(head.starts_with("POST /hook"), "{head}");
    assert!(head.to_ascii_lowercase().contains("user-agent: storage-ops-notification/1.0"));
    let json: serde_json::Value = serde_json::from_str(&body).expect("json body");
    assert_eq!(json["subject"], "Sync completed");
    assert_eq!(json["status"], "good");
    assert_eq!(json["details"], "details here");
}

#[test]
fn webhook_unlisted_success_status_is_a_failure() {
    let (url, server) = serve_once("HTTP/1.1 203 Non-Authoritative Information");
    let dispatcher = Dispatcher::new(vec![webhook(url)], "nas").expect("dispatcher");
    assert!(!dispatcher.send(&Notification::new("s", "j", Status::Info, "m")));
    server.join().expect("server thread");
}

#[test]
fn mailbox_pipes_plain_text_body_to_mail_program() {
    let dir = TempDir::new().expect("tempdir");
    let capture = dir.path().join("mail.out");
    let script = dir.path().join("fake-mail");
    std::fs::write(
        &script,
        format!(
            "#!/bin/sh\necho \"$2|$3\" > '{0}'\ncat >> '{0}'\n",
            capture.display()
        ),
    )
    .expect("write script");
    std::fs::set_permissions(&script, std::fs::Permissions::from_mode(0o755)).expect("chmod");

    let dispatcher = Dispatcher::new(vec![mailbox("ops@example.com")], "nas01")
        .expect("dispatcher")
        .with_mail_program(&script);
    let note = Notification::new("Error: Scrub failed", "scrub", Status::Error, "disk gone")
        .with_details("not in email");

    assert!(dispatcher.send(&note));

    let out = std::fs::read_to_string(&capture).expect("captured mail");
    assert!(out.starts_with("Error: Scrub failed|ops@example.com\n"), "{out}");
    assert!(out.contains("Job: scrub\nStatus: ERROR\n\ndisk gone\n"));
    assert!(!out.contains("not in email"));
}

#[test]
fn one_working_target_is_enough() {
    let (url, server) = serve_once("HTTP/1.1 200 OK");
    let dispatcher = Dispatcher::new(vec![mailbox("ops@example.com"), webhook(url)], "nas")
        .expect("dispatcher")
        .with_mail_program("/nonexistent/mail");
    assert!(dispatcher.send(&Notification::new("s", "j", Status::Info, "m")));
    server.join().expect("server thread");
}

#[test]
fn no_targets_is_trivially_delivered() {
    let dispatcher = Dispatcher::new(vec![], "nas").expect("dispatcher");
    assert!(!dispatcher.has_targets());
    assert!(dispatcher.send(&Notification::new("s", "j", Status::Info, "m")));
}

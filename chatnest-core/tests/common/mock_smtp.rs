//! In-process SMTP server that keeps every message it receives

#![allow(dead_code)]

use mailin_embedded::response::{OK, START_DATA};
use mailin_embedded::{Handler, Response, Server};
use std::net::{IpAddr, TcpListener};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::{Duration, Instant};

/// A message as seen on the wire
#[derive(Debug, Clone)]
pub struct ReceivedMail {
    pub from: String,
    pub to: Vec<String>,
    pub data: String,
}

impl ReceivedMail {
    /// Body lines with quoted-printable soft line breaks joined back up
    pub fn unfolded_lines(&self) -> Vec<String> {
        self.data
            .replace("=\r\n", "")
            .lines()
            .map(|line| line.trim_end().to_string())
            .collect()
    }
}

#[derive(Clone, Default)]
struct Recorder {
    inbox: Arc<Mutex<Vec<ReceivedMail>>>,
    from: String,
    to: Vec<String>,
    data: Vec<u8>,
}

impl Handler for Recorder {
    fn helo(&mut self, _ip: IpAddr, _domain: &str) -> Response {
        OK
    }

    fn mail(&mut self, _ip: IpAddr, _domain: &str, from: &str) -> Response {
        self.from = from.to_string();
        self.to.clear();
        self.data.clear();
        OK
    }

    fn rcpt(&mut self, to: &str) -> Response {
        self.to.push(to.to_string());
        OK
    }

    fn data_start(&mut self, _domain: &str, _from: &str, _is8bit: bool, _to: &[String]) -> Response {
        START_DATA
    }

    fn data(&mut self, buf: &[u8]) -> std::io::Result<()> {
        self.data.extend_from_slice(buf);
        Ok(())
    }

    fn data_end(&mut self) -> Response {
        let mail = ReceivedMail {
            from: self.from.clone(),
            to: self.to.clone(),
            data: String::from_utf8_lossy(&self.data).into_owned(),
        };
        self.inbox.lock().unwrap().push(mail);
        self.data.clear();
        OK
    }
}

pub struct MockSmtp {
    port: u16,
    inbox: Arc<Mutex<Vec<ReceivedMail>>>,
}

impl MockSmtp {
    /// Start a server on a free local port
    pub fn start() -> Self {
        let port = free_port();
        let inbox = Arc::new(Mutex::new(Vec::new()));

        let recorder = Recorder {
            inbox: inbox.clone(),
            ..Recorder::default()
        };
        thread::spawn(move || {
            let mut server = Server::new(recorder);
            server
                .with_addr(format!("127.0.0.1:{}", port))
                .expect("mock smtp address");
            let _ = server.serve();
        });

        // wait until the listener accepts connections
        let started = Instant::now();
        while std::net::TcpStream::connect(("127.0.0.1", port)).is_err() {
            assert!(started.elapsed() < Duration::from_secs(5), "mock smtp did not start");
            thread::sleep(Duration::from_millis(20));
        }

        Self { port, inbox }
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    pub fn received(&self) -> Vec<ReceivedMail> {
        self.inbox.lock().unwrap().clone()
    }

    /// Latest message addressed to `email`
    pub fn last_for(&self, email: &str) -> Option<ReceivedMail> {
        self.received()
            .into_iter()
            .rev()
            .find(|mail| mail.to.iter().any(|to| to.contains(email)))
    }
}

/// A local port nothing is listening on
pub fn free_port() -> u16 {
    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    listener.local_addr().unwrap().port()
}

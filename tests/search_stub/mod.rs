use std::sync::{Arc, Mutex, mpsc};
use std::thread;
use std::time::Duration;

use serde_json::Value;

/// How the stub answers a search request for a given page index.
#[allow(dead_code)]
#[derive(Debug, Clone)]
pub enum PageReply {
    Json(Value),
    Status(u16, &'static str),
}

#[derive(Debug, Clone)]
pub struct SearchStubConfig {
    pub count_reply: PageReply,
    pub pages: Vec<PageReply>,
}

pub struct SearchStub {
    pub base_url: String,
    requests: Arc<Mutex<Vec<Value>>>,
    shutdown_tx: Option<mpsc::Sender<()>>,
    handle: Option<thread::JoinHandle<()>>,
}

impl SearchStub {
    pub fn spawn(config: SearchStubConfig) -> Self {
        let server = tiny_http::Server::http("127.0.0.1:0").expect("start search stub server");
        let base_url = format!("http://{}", server.server_addr());

        let requests = Arc::new(Mutex::new(Vec::new()));
        let seen = Arc::clone(&requests);
        let (shutdown_tx, shutdown_rx) = mpsc::channel::<()>();

        let handle = thread::spawn(move || {
            loop {
                if shutdown_rx.try_recv().is_ok() {
                    break;
                }

                let mut request = match server.recv_timeout(Duration::from_millis(50)) {
                    Ok(Some(req)) => req,
                    Ok(None) => continue,
                    Err(_) => break,
                };

                let mut body = String::new();
                if request.as_reader().read_to_string(&mut body).is_err() {
                    let _ = request.respond(
                        tiny_http::Response::from_string("invalid request body")
                            .with_status_code(400),
                    );
                    continue;
                }
                let parsed: Value = serde_json::from_str(&body).unwrap_or(Value::Null);

                let reply = match (request.method(), request.url()) {
                    (tiny_http::Method::Post, "/api/search-jobs/get-total-count") => {
                        config.count_reply.clone()
                    }
                    (tiny_http::Method::Post, "/api/search-jobs") => {
                        seen.lock().expect("requests lock").push(parsed.clone());
                        let page = parsed.get("page").and_then(Value::as_u64).unwrap_or(0);
                        config
                            .pages
                            .get(page as usize)
                            .cloned()
                            .unwrap_or(PageReply::Json(serde_json::json!({ "results": [] })))
                    }
                    _ => PageReply::Status(404, "not found"),
                };

                let response = match reply {
                    PageReply::Json(value) => {
                        let header = tiny_http::Header::from_bytes(
                            &b"Content-Type"[..],
                            &b"application/json"[..],
                        )
                        .expect("build header");
                        tiny_http::Response::from_string(value.to_string()).with_header(header)
                    }
                    PageReply::Status(code, text) => {
                        tiny_http::Response::from_string(text).with_status_code(code)
                    }
                };
                let _ = request.respond(response);
            }
        });

        Self {
            base_url,
            requests,
            shutdown_tx: Some(shutdown_tx),
            handle: Some(handle),
        }
    }

    /// JSON bodies of every search-page request received so far.
    pub fn search_requests(&self) -> Vec<Value> {
        self.requests.lock().expect("requests lock").clone()
    }
}

impl Drop for SearchStub {
    fn drop(&mut self) {
        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.send(());
        }
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}

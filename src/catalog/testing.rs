//! In-process fake of the catalog API for tests.

use serde_json::json;
use std::sync::{Arc, Mutex};
use std::thread::JoinHandle;
use tiny_http::{Header, Response, Server};

#[derive(Debug, Clone)]
pub struct RecordedRequest {
  pub url: String,
  pub authorization: Option<String>,
}

type Handler = dyn Fn(&str) -> (u16, String) + Send + Sync;

/// HTTP server answering every request with `handler(url)`.
pub struct FakeCatalog {
  server: Arc<Server>,
  thread: Option<JoinHandle<()>>,
  requests: Arc<Mutex<Vec<RecordedRequest>>>,
  port: u16,
}

impl FakeCatalog {
  pub fn start(handler: impl Fn(&str) -> (u16, String) + Send + Sync + 'static) -> Self {
    let server = Arc::new(Server::http("127.0.0.1:0").unwrap());
    let port = server.server_addr().to_ip().unwrap().port();
    let requests = Arc::new(Mutex::new(Vec::new()));
    let handler: Arc<Handler> = Arc::new(handler);

    let thread = {
      let server = Arc::clone(&server);
      let requests = Arc::clone(&requests);
      std::thread::spawn(move || {
        for request in server.incoming_requests() {
          let url = request.url().to_string();
          let authorization = request
            .headers()
            .iter()
            .find(|h| h.field.equiv("Authorization"))
            .map(|h| h.value.as_str().to_string());
          requests.lock().unwrap().push(RecordedRequest {
            url: url.clone(),
            authorization,
          });

          let (status, body) = handler(&url);
          let content_type = Header::from_bytes(&b"Content-Type"[..], &b"application/json"[..]).unwrap();
          let response = Response::from_data(body.into_bytes())
            .with_status_code(status)
            .with_header(content_type);
          let _ = request.respond(response);
        }
      })
    };

    Self {
      server,
      thread: Some(thread),
      requests,
      port,
    }
  }

  pub fn base_url(&self) -> String {
    format!("http://127.0.0.1:{}/api/v3/lego/", self.port)
  }

  pub fn requests(&self) -> Vec<RecordedRequest> {
    self.requests.lock().unwrap().clone()
  }
}

impl Drop for FakeCatalog {
  fn drop(&mut self) {
    self.server.unblock();
    if let Some(thread) = self.thread.take() {
      let _ = thread.join();
    }
  }
}

/// Render an inventory page. Lines are `(part_num, color_id, quantity, is_spare)`.
pub fn inventory_page(count: u32, has_next: bool, lines: &[(&str, i32, u32, bool)]) -> String {
  let results: Vec<_> = lines
    .iter()
    .map(|(part_num, color_id, quantity, is_spare)| {
      json!({
        "part": { "part_num": part_num, "name": format!("Part {}", part_num) },
        "color": { "id": color_id, "name": "Color", "rgb": "FFFFFF" },
        "quantity": quantity,
        "is_spare": is_spare,
      })
    })
    .collect();

  json!({
    "count": count,
    "next": if has_next { Some("http://next") } else { None },
    "previous": null,
    "results": results,
  })
  .to_string()
}

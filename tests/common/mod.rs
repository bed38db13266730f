// Shared fixtures for the integration tests: a wiremock server standing in
// for both Scratch hosts.
//
// The client under test is blocking, so the mock server gets its own tokio
// runtime and requests are made from the plain test thread.

#![allow(dead_code)]

use serde_json::{json, Value};
use tokio::runtime::Runtime;
use wiremock::{Mock, MockServer, Request};

pub struct Backend {
    // Declared first so the server shuts down before its runtime.
    server: MockServer,
    runtime: Runtime,
}

impl Backend {
    pub fn start() -> Self {
        let runtime = Runtime::new().expect("tokio runtime");
        let server = runtime.block_on(MockServer::start());
        Self { server, runtime }
    }

    pub fn uri(&self) -> String {
        self.server.uri()
    }

    pub fn mount(&self, mock: Mock) {
        self.runtime.block_on(mock.mount(&self.server));
    }

    pub fn requests(&self) -> Vec<Request> {
        self.runtime
            .block_on(self.server.received_requests())
            .unwrap_or_default()
    }

    /// Number of requests that hit `path`.
    pub fn hits(&self, path: &str) -> usize {
        self.requests()
            .iter()
            .filter(|r| r.url.path() == path)
            .count()
    }
}

/// A `/users/{username}` document with no "what I'm working on" text.
pub fn user_body(id: u64, username: &str) -> Value {
    json!({
        "id": id,
        "username": username,
        "scratchteam": false,
        "history": {"joined": "2015-03-01T12:00:00.000Z"},
        "profile": {
            "id": id + 1000,
            "images": {"90x90": format!("https://cdn2.scratch.mit.edu/get_image/user/{}_90x90.png", id)},
            "status": null,
            "bio": "I like cats and code.",
            "country": "Canada"
        }
    })
}

/// A `/session/` document for a valid session.
pub fn session_body(id: u64, username: &str, token: &str) -> Value {
    json!({
        "user": {"id": id, "username": username, "token": token},
        "permissions": {"scratcher": true}
    })
}

use std::sync::{Arc, Mutex};

use actix_ws::Session;
use bytestring::ByteString;
use serde::Serialize;
use serde_json::Value;

use super::channel::{self, UnboundedSender};

/// Listener identity. `email` carries the lowercased md5 of the address the
/// user entered, never the raw address; two listeners are the same person
/// only when both fields match.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct User {
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
}

impl User {
    pub fn new(name: impl Into<String>) -> User {
        User {
            name: name.into(),
            email: None,
        }
    }

    pub fn with_email(name: String, email: &str) -> User {
        let email = email.trim().to_lowercase();
        if email.is_empty() {
            return User { name, email: None };
        }
        User {
            name,
            email: Some(format!("{:x}", md5::compute(email.as_bytes()))),
        }
    }
}

/// `203.0.113.7:52344` → `203.0.*.*`. Shown in rosters instead of the peer
/// address.
pub fn mask_ip(addr: &str) -> String {
    let addr = last_cut(addr, ':');
    let addr = last_cut(addr, '.');
    let addr = last_cut(addr, '.');
    format!("{addr}.*.*")
}

fn last_cut(s: &str, sep: char) -> &str {
    match s.rfind(sep) {
        Some(i) => &s[..i],
        None => s,
    }
}

/// One listener socket: masked peer ip, mutable identity, and the outbound
/// frame queue drained by a dedicated writer task.
pub struct Connection {
    pub ip: String,
    user: Mutex<User>,
    send: UnboundedSender<ByteString>,
}

impl Connection {
    /// Builds the connection and spawns its writer. The writer exits when the
    /// send queue input is closed or the socket errors out.
    pub fn start(mut session: Session, ip: String) -> Arc<Connection> {
        let (send, mut rx) = channel::unbounded::<ByteString>(8);
        let conn = Arc::new(Connection {
            ip,
            user: Mutex::new(User::default()),
            send,
        });

        actix_rt::spawn(async move {
            while let Some(frame) = rx.recv().await {
                if session.text(frame).await.is_err() {
                    break;
                }
            }
            let _ = session.close(None).await;
        });

        conn
    }

    pub fn user(&self) -> User {
        self.user.lock().unwrap().clone()
    }

    pub fn set_user(&self, user: User) {
        *self.user.lock().unwrap() = user;
    }

    /// Name shown in chat and rosters. Anonymous listeners get the masked ip
    /// appended so two unnamed guests stay distinguishable.
    pub fn display_name(&self) -> String {
        let user = self.user.lock().unwrap();
        if user.email.is_some() {
            user.name.clone()
        } else {
            format!("{}({})", user.name, self.ip)
        }
    }

    pub async fn send(&self, j: &Value) {
        self.send_raw(enc_json(j)).await;
    }

    /// Pushes an already-encoded frame, so room fan-out encodes once.
    pub async fn send_raw(&self, frame: ByteString) {
        self.send.send(frame).await;
    }

    /// Closes the send queue input, which cascades into the writer's exit.
    pub fn close(&self) {
        self.send.close();
    }
}

pub fn enc_json(j: &Value) -> ByteString {
    ByteString::from(j.to_string())
}

//! In-process fake server speaking just enough `OP_MSG` for unit tests

use crate::protocol::{decode_message, encode_message, OpMsg};
use bson::{doc, Document};
use bytes::{Buf, BytesMut};
use std::sync::{Arc, Mutex};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};

type Handler = Arc<dyn Fn(&Document) -> Document + Send + Sync>;

pub(crate) struct MockServer {
    pub port: u16,
    requests: Arc<Mutex<Vec<Document>>>,
    accepted: Arc<Mutex<usize>>,
    task: tokio::task::JoinHandle<()>,
}

impl MockServer {
    /// Listen on an ephemeral port; `handler` produces the reply body for each command
    ///
    /// An empty reply document means the command is never answered.
    pub async fn start<F>(handler: F) -> Self
    where
        F: Fn(&Document) -> Document + Send + Sync + 'static,
    {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        let requests = Arc::new(Mutex::new(Vec::new()));
        let accepted = Arc::new(Mutex::new(0));
        let handler: Handler = Arc::new(handler);

        let task = {
            let requests = requests.clone();
            let accepted = accepted.clone();
            tokio::spawn(async move {
                while let Ok((stream, _)) = listener.accept().await {
                    *accepted.lock().unwrap() += 1;
                    tokio::spawn(serve(stream, handler.clone(), requests.clone()));
                }
            })
        };

        Self {
            port,
            requests,
            accepted,
            task,
        }
    }

    pub fn default_reply(command: &Document) -> Document {
        if command.contains_key("hello") {
            doc! { "ok": 1, "isWritablePrimary": true, "maxWireVersion": 17 }
        } else {
            doc! { "ok": 1 }
        }
    }

    /// Every command received so far, in arrival order
    pub fn requests(&self) -> Vec<Document> {
        self.requests.lock().unwrap().clone()
    }

    /// Number of accepted TCP connections
    pub fn connections(&self) -> usize {
        *self.accepted.lock().unwrap()
    }
}

impl Drop for MockServer {
    fn drop(&mut self) {
        self.task.abort();
    }
}

async fn serve(mut stream: TcpStream, handler: Handler, requests: Arc<Mutex<Vec<Document>>>) {
    let mut buf = BytesMut::new();
    loop {
        match decode_message(&buf) {
            Ok((header, msg, consumed)) => {
                buf.advance(consumed);
                requests.lock().unwrap().push(msg.body.clone());

                let reply = handler(&msg.body);
                if reply.is_empty() {
                    continue;
                }
                let mut frame =
                    encode_message(header.request_id + 1_000_000, &OpMsg::command(reply))
                        .unwrap();
                frame[8..12].copy_from_slice(&header.request_id.to_le_bytes());
                if stream.write_all(&frame).await.is_err() {
                    return;
                }
            }
            Err(_) => match stream.read_buf(&mut buf).await {
                Ok(0) | Err(_) => return,
                Ok(_) => {}
            },
        }
    }
}

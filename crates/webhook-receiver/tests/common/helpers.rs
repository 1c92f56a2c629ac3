// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Helper functions for integration tests

#![allow(dead_code)]

use batcher::BatcherHandle;
use http_body_util::{BodyExt, Full};
use hyper::body::Bytes;
use hyper::{Request, Response};
use hyper_util::rt::TokioIo;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::task::JoinHandle;
use tokio::time::timeout;
use tokio_util::sync::CancellationToken;
use webhook_receiver::{Payload, Receiver, ReceiverError};

pub const SAMPLE_PAYLOAD: &str = r#"{
    "user_id": 1,
    "total": 1.65,
    "title": "delectus aut autem",
    "meta": {
        "logins": [{ "time": "2020-08-08T01:52:50Z", "ip": "0.0.0.0" }],
        "phone_numbers": { "home": "555-1212", "mobile": "123-5555" }
    },
    "completed": false
}"#;

/// Sample payload with its own `user_id`
pub fn sample_payload(user_id: i64) -> Vec<u8> {
    SAMPLE_PAYLOAD
        .replacen("\"user_id\": 1", &format!("\"user_id\": {user_id}"), 1)
        .into_bytes()
}

pub struct RunningReceiver {
    pub port: u16,
    pub cancel_token: CancellationToken,
    pub task: JoinHandle<Result<(), ReceiverError>>,
}

impl RunningReceiver {
    pub async fn shutdown(self) {
        self.cancel_token.cancel();
        timeout(Duration::from_secs(2), self.task)
            .await
            .expect("receiver did not stop")
            .expect("receiver task panicked")
            .expect("receiver failed");
    }
}

/// Serve a receiver on an ephemeral local port
pub async fn start_receiver(
    handle: BatcherHandle<Payload>,
    max_content_length: usize,
) -> RunningReceiver {
    let listener = TcpListener::bind("127.0.0.1:0")
        .await
        .expect("failed to bind test listener");
    let port = listener.local_addr().expect("no local addr").port();
    let cancel_token = CancellationToken::new();
    let receiver = Receiver::new(handle, max_content_length);
    let task = tokio::spawn(receiver.serve(listener, cancel_token.clone()));

    RunningReceiver {
        port,
        cancel_token,
        task,
    }
}

/// Send an HTTP request over TCP and return the response
pub async fn send_tcp_request(
    port: u16,
    uri: &str,
    method: &str,
    body: Option<Vec<u8>>,
) -> Result<Response<hyper::body::Incoming>, Box<dyn std::error::Error>> {
    let stream = timeout(
        Duration::from_secs(2),
        tokio::net::TcpStream::connect(format!("127.0.0.1:{}", port)),
    )
    .await??;

    let io = TokioIo::new(stream);
    let (mut sender, conn) = hyper::client::conn::http1::handshake(io).await?;

    tokio::spawn(async move {
        let _ = conn.await;
    });

    let mut request_builder = Request::builder()
        .uri(uri)
        .method(method)
        .header("Content-Type", "application/json");

    let request = if let Some(body_data) = body {
        request_builder = request_builder.header("Content-Length", body_data.len().to_string());
        request_builder.body(Full::new(Bytes::from(body_data)))?
    } else {
        request_builder.body(Full::new(Bytes::new()))?
    };

    Ok(timeout(Duration::from_secs(2), sender.send_request(request)).await??)
}

pub async fn response_body(response: Response<hyper::body::Incoming>) -> String {
    let bytes = response
        .into_body()
        .collect()
        .await
        .expect("failed to read response body")
        .to_bytes();
    String::from_utf8(bytes.to_vec()).expect("response body is not utf-8")
}

// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! End-to-end tests against an in-process fake nsqd: the adapter connects
//! over real TCP, the test decodes the PUB frames it receives and asserts
//! on the JSON envelopes.

use std::collections::HashMap;
use std::time::Duration;

use nsq_adapter::adapter::{NsqAdapter, RawRecord};
use nsq_adapter::identity::ProcessIdentity;
use nsq_adapter::producer::{NsqProducer, Publisher, RetryStrategy};
use serde_json::Value;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;
use tokio::time::timeout;
use tokio_util::sync::CancellationToken;

async fn expect_magic(stream: &mut TcpStream) {
    let mut magic = [0u8; 4];
    stream.read_exact(&mut magic).await.expect("magic bytes");
    assert_eq!(&magic, b"  V2");
}

async fn read_pub_frame(stream: &mut TcpStream) -> (String, Vec<u8>) {
    let mut line = Vec::new();
    loop {
        let byte = stream.read_u8().await.expect("command byte");
        if byte == b'\n' {
            break;
        }
        line.push(byte);
    }
    let command = String::from_utf8(line).expect("utf8 command");
    let topic = command
        .strip_prefix("PUB ")
        .expect("PUB command")
        .to_string();

    let size = stream.read_u32().await.expect("body size");
    let mut body = vec![0u8; size as usize];
    stream.read_exact(&mut body).await.expect("body");
    (topic, body)
}

async fn send_frame(stream: &mut TcpStream, frame_type: i32, data: &[u8]) {
    let mut frame = Vec::with_capacity(data.len() + 8);
    frame.extend_from_slice(&((data.len() + 4) as u32).to_be_bytes());
    frame.extend_from_slice(&frame_type.to_be_bytes());
    frame.extend_from_slice(data);
    stream.write_all(&frame).await.expect("response frame");
}

#[tokio::test]
async fn adapter_ships_records_end_to_end() {
    let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
    let local = listener.local_addr().expect("local addr");

    let server = tokio::spawn(async move {
        let (mut stream, _) = listener.accept().await.expect("accept");
        expect_magic(&mut stream).await;

        let first = read_pub_frame(&mut stream).await;
        send_frame(&mut stream, 0, b"OK").await;

        // Heartbeat between commands; the producer must answer NOP and
        // keep waiting for the real response.
        let second = read_pub_frame(&mut stream).await;
        send_frame(&mut stream, 0, b"_heartbeat_").await;
        let mut nop = [0u8; 4];
        stream.read_exact(&mut nop).await.expect("NOP");
        assert_eq!(&nop, b"NOP\n");
        send_frame(&mut stream, 0, b"OK").await;

        vec![first, second]
    });

    let address = format!("{local}/orders");
    let adapter = NsqAdapter::connect(&address, &HashMap::new(), ProcessIdentity::generate())
        .await
        .expect("adapter construction")
        .with_fallback_hostname("host-1");
    assert_eq!(adapter.topic().as_str(), "orders#ephemeral");

    let (tx, rx) = mpsc::channel(8);
    let cancel = CancellationToken::new();
    let loop_handle = tokio::spawn(adapter.run(rx, cancel.clone()));

    tx.send(RawRecord::from_message("boot ok")).await.expect("send");
    let mut second = RawRecord::from_message("ready");
    second.hostname = "host-2".to_string();
    second.container_name = Some("web-1".to_string());
    tx.send(second).await.expect("send");

    let frames = timeout(Duration::from_secs(5), server)
        .await
        .expect("fake nsqd timed out")
        .expect("server task");

    let (topic, body) = &frames[0];
    assert_eq!(topic, "orders#ephemeral");
    let doc: Value = serde_json::from_slice(body).expect("json envelope");
    assert_eq!(doc["data"]["msg"], "boot ok");
    assert_eq!(doc["data"]["hostname"], "host-1");
    assert_eq!(doc["data"]["severity"], "raw");
    assert_eq!(doc["data"]["service"], "testsvc");
    assert_eq!(doc["data"]["application"], "testapp");
    assert_eq!(doc["meta"]["process_ctx_id"], doc["data"]["parent_ctx_id"]);

    let (_, body) = &frames[1];
    let doc: Value = serde_json::from_slice(body).expect("json envelope");
    assert_eq!(doc["data"]["msg"], "ready");
    assert_eq!(doc["data"]["hostname"], "host-2");
    assert_eq!(doc["data"]["dockername"], "web-1");

    drop(tx);
    cancel.cancel();
    let _ = timeout(Duration::from_secs(1), loop_handle).await;
}

#[tokio::test]
async fn legacy_topic_option_is_migrated_on_the_wire() {
    let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
    let local = listener.local_addr().expect("local addr");

    let server = tokio::spawn(async move {
        let (mut stream, _) = listener.accept().await.expect("accept");
        expect_magic(&mut stream).await;
        let frame = read_pub_frame(&mut stream).await;
        send_frame(&mut stream, 0, b"OK").await;
        frame
    });

    let options = HashMap::from([("topic".to_string(), "orders#legacy".to_string())]);
    let adapter = NsqAdapter::connect(&local.to_string(), &options, ProcessIdentity::generate())
        .await
        .expect("adapter construction");

    let (tx, rx) = mpsc::channel(1);
    tx.send(RawRecord::from_message("boot ok")).await.expect("send");
    drop(tx);
    adapter.run(rx, CancellationToken::new()).await;

    let (topic, _) = timeout(Duration::from_secs(5), server)
        .await
        .expect("fake nsqd timed out")
        .expect("server task");
    assert_eq!(topic, "orders#ephemeral");
}

#[tokio::test]
async fn producer_reconnects_and_retries_after_error_frame() {
    let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
    let local = listener.local_addr().expect("local addr");

    let server = tokio::spawn(async move {
        // First connection fails the publish with a broker error.
        let (mut first, _) = listener.accept().await.expect("accept");
        expect_magic(&mut first).await;
        let _ = read_pub_frame(&mut first).await;
        send_frame(&mut first, 1, b"E_PUB_FAILED PUB failed").await;

        // The producer drops that connection and retries on a fresh one.
        let (mut second, _) = listener.accept().await.expect("accept");
        expect_magic(&mut second).await;
        let frame = read_pub_frame(&mut second).await;
        send_frame(&mut second, 0, b"OK").await;
        frame
    });

    let producer = NsqProducer::connect(&local.to_string())
        .await
        .expect("producer construction")
        .with_retry_strategy(RetryStrategy::Immediate(2));

    timeout(
        Duration::from_secs(5),
        producer.publish("orders#ephemeral", br#"{"data":{}}"#),
    )
    .await
    .expect("publish timed out")
    .expect("retry should succeed");

    let (topic, body) = timeout(Duration::from_secs(5), server)
        .await
        .expect("fake nsqd timed out")
        .expect("server task");
    assert_eq!(topic, "orders#ephemeral");
    assert_eq!(body, br#"{"data":{}}"#);
}

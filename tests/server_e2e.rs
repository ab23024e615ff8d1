//! End-to-end tests against a real HTTP server on an ephemeral port

use std::sync::Arc;

use fog_view_client::{ClientError, QuerySession, ViewClient};
use fog_view_core::constants::{ADDRESS_KEY_LEN, SEARCH_KEY_LEN};
use fog_view_core::{
    KexRngPubkey, QueryEnvelope, QueryRequest, QueryRequestAad, RngRecord, TxOutSearchResultCode,
};
use fog_view_server::{
    MemoryMissedRanges, MemoryRngDirectory, MemoryTxOutIndex, ProcessedBlock, ServerBuilder,
    ServerConfig,
};
use tokio::net::TcpListener;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;

const CT_LEN: usize = 64;

struct TestServer {
    url: String,
    directory: Arc<MemoryRngDirectory>,
    index: Arc<MemoryTxOutIndex>,
    shutdown: Option<oneshot::Sender<()>>,
    handle: Option<JoinHandle<()>>,
}

impl TestServer {
    async fn start() -> Self {
        let directory = Arc::new(MemoryRngDirectory::new());
        let missed = Arc::new(MemoryMissedRanges::new());
        let index = Arc::new(MemoryTxOutIndex::new());

        directory
            .publish_rng_record(RngRecord::new(1, KexRngPubkey::default(), 0))
            .unwrap();
        for block in 0..8 {
            directory.report_ingested_block(1, block, 500 + block).unwrap();
        }
        missed.report_missed(3, 4).unwrap();
        index.advance(ProcessedBlock::new(8, 507), 9, 77);

        let mut config = ServerConfig::default();
        config.reconciler.ciphertext_len = CT_LEN;
        config.reconciler.max_search_keys = 32;

        let server = ServerBuilder::new(config)
            .directory(directory.clone())
            .missed_ranges(missed)
            .index(index.clone())
            .build()
            .unwrap();

        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let url = format!("http://{}", listener.local_addr().unwrap());
        let (tx, rx) = oneshot::channel::<()>();
        let handle = tokio::spawn(async move {
            server
                .serve_on(listener, async {
                    let _ = rx.await;
                })
                .await
                .unwrap();
        });

        Self {
            url,
            directory,
            index,
            shutdown: Some(tx),
            handle: Some(handle),
        }
    }

    fn client(&self) -> ViewClient {
        ViewClient::new(&self.url)
    }

    async fn stop(mut self) {
        if let Some(tx) = self.shutdown.take() {
            let _ = tx.send(());
        }
        if let Some(handle) = self.handle.take() {
            handle.await.unwrap();
        }
    }
}

fn key(byte: u8) -> Vec<u8> {
    vec![byte; SEARCH_KEY_LEN]
}

#[tokio::test]
async fn test_session_over_http() {
    let server = TestServer::start().await;
    let client = server.client();
    server.index.insert(key(1), vec![0x5a; CT_LEN]);

    let health = client.health().await.unwrap();
    assert_eq!(health.status, "ok");

    let mut session = QuerySession::with_address(vec![9u8; ADDRESS_KEY_LEN]);
    let bootstrap = client
        .query(&session.next_request(Vec::new(), true))
        .await
        .unwrap();
    let update = session.apply(&bootstrap);

    assert_eq!(update.new_rngs.len(), 1);
    assert_eq!(session.event_cursor(), 1);
    assert_eq!(session.block_cursor(), 8);
    assert_eq!(session.last_known_block_count(), 9);
    assert_eq!(session.missed_ranges().len(), 1);
    assert_eq!(bootstrap.highest_processed_block_signature_timestamp, 507);

    let keys = vec![key(1), key(2), vec![1, 2, 3], key(4)];
    let response = client
        .query(&session.next_request(keys, true))
        .await
        .unwrap();
    let codes: Vec<TxOutSearchResultCode> = response
        .tx_out_search_results
        .iter()
        .map(|r| r.result_code)
        .collect();
    assert_eq!(
        codes,
        vec![
            TxOutSearchResultCode::Found,
            TxOutSearchResultCode::NotFound,
            TxOutSearchResultCode::BadSearchKey,
            TxOutSearchResultCode::NotFound,
        ]
    );
    assert!(response
        .tx_out_search_results
        .iter()
        .all(|r| r.ciphertext.len() == CT_LEN));
    assert_eq!(response.next_start_from_user_event_id, 1);

    let health = client.health().await.unwrap();
    assert_eq!(health.queries_served, 2);

    server.stop().await;
}

#[tokio::test]
async fn test_invalid_query_is_permanent_error() {
    let server = TestServer::start().await;
    let client = server.client();

    let keys = (0..33u8).map(key).collect();
    let envelope = QueryEnvelope::new(QueryRequestAad::new(0, 0), QueryRequest::new(keys));
    let err = client.query(&envelope).await.unwrap_err();

    match &err {
        ClientError::Server { status, message } => {
            assert_eq!(*status, 400);
            assert!(message.contains("33 search keys"), "message: {message}");
        }
        other => panic!("unexpected error: {other}"),
    }
    assert!(!err.is_retryable());

    server.stop().await;
}

#[tokio::test]
async fn test_unavailable_directory_is_retryable() {
    let server = TestServer::start().await;
    let client = server.client();
    server.directory.set_available(false);

    let session = QuerySession::with_address(vec![9u8; ADDRESS_KEY_LEN]);
    let err = client
        .query(&session.next_request(Vec::new(), true))
        .await
        .unwrap_err();
    assert!(matches!(err, ClientError::Server { status: 503, .. }));
    assert!(err.is_retryable());

    server.directory.set_available(true);
    assert!(client
        .query(&session.next_request(Vec::new(), true))
        .await
        .is_ok());

    server.stop().await;
}

#[tokio::test]
async fn test_malformed_body_rejected() {
    let server = TestServer::start().await;

    let resp = reqwest::Client::new()
        .post(format!("{}/query", server.url))
        .body(vec![0u8; 2])
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status().as_u16(), 400);

    let body: serde_json::Value = resp.json().await.unwrap();
    assert_eq!(body["code"], "CODEC_ERROR");

    server.stop().await;
}

#[tokio::test]
async fn test_concurrent_clients() {
    let server = TestServer::start().await;
    server.index.insert(key(7), vec![0x77; CT_LEN]);

    let mut tasks = Vec::new();
    for i in 0..16u8 {
        let client = server.client();
        tasks.push(tokio::spawn(async move {
            let session = QuerySession::bootstrap();
            let keys = vec![key(7), key(100 + i)];
            client.query(&session.next_request(keys, false)).await
        }));
    }

    for task in tasks {
        let response = task.await.unwrap().unwrap();
        assert_eq!(response.found().count(), 1);
        assert_eq!(response.highest_processed_block_count, 8);
    }

    server.stop().await;
}

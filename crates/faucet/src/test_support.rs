//! Test doubles for the wallet tool and the node

use crate::error::{FaucetError, FaucetResult};
use crate::ledger::TransactionLedger;
use crate::process::{CommandRunner, ExecStrategy, WalletConfig};
use crate::wallet::{SyncPolicy, WalletClient};
use async_trait::async_trait;
use axum::{routing::post, Json, Router};
use serde_json::{json, Value};
use std::collections::{HashMap, VecDeque};
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// Answers wallet commands from per-verb scripts.
///
/// Queued responses are consumed first, then the sticky response for the
/// verb. Unscripted verbs fail like an unreachable wallet. Verbs marked
/// slow stay "running" for their delay, and the peak number of overlapping
/// runs is recorded.
#[derive(Default)]
pub struct ScriptedRunner {
    queued: Mutex<HashMap<String, VecDeque<FaucetResult<String>>>>,
    sticky: Mutex<HashMap<String, String>>,
    delays: Mutex<HashMap<String, Duration>>,
    calls: Mutex<Vec<String>>,
    running: AtomicUsize,
    peak_running: AtomicUsize,
}

impl ScriptedRunner {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn set(&self, verb: &str, output: &str) {
        self.sticky
            .lock()
            .unwrap()
            .insert(verb.to_string(), output.to_string());
    }

    pub fn push(&self, verb: &str, response: FaucetResult<String>) {
        self.queued
            .lock()
            .unwrap()
            .entry(verb.to_string())
            .or_default()
            .push_back(response);
    }

    pub fn slow(&self, verb: &str, delay: Duration) {
        self.delays.lock().unwrap().insert(verb.to_string(), delay);
    }

    /// Most runs ever in progress at once
    pub fn peak_running(&self) -> usize {
        self.peak_running.load(Ordering::SeqCst)
    }

    /// Full command lines, in call order
    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    pub fn count(&self, verb: &str) -> usize {
        self.calls()
            .iter()
            .filter(|c| c.split_whitespace().next() == Some(verb))
            .count()
    }

    fn respond(&self, verb: &str) -> FaucetResult<String> {
        if let Some(response) = self
            .queued
            .lock()
            .unwrap()
            .get_mut(verb)
            .and_then(VecDeque::pop_front)
        {
            return response;
        }

        match self.sticky.lock().unwrap().get(verb) {
            Some(output) => Ok(output.clone()),
            None => Err(FaucetError::ProcessFailed(format!(
                "no scripted response for '{}'",
                verb
            ))),
        }
    }
}

#[async_trait]
impl CommandRunner for ScriptedRunner {
    async fn run(&self, command: &str, _timeout: Duration) -> FaucetResult<String> {
        self.calls.lock().unwrap().push(command.to_string());
        let verb = command.split_whitespace().next().unwrap_or_default();

        let running = self.running.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak_running.fetch_max(running, Ordering::SeqCst);
        let delay = self.delays.lock().unwrap().get(verb).copied();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        let response = self.respond(verb);
        self.running.fetch_sub(1, Ordering::SeqCst);
        response
    }
}

/// Sync policy with every delay removed
pub fn instant_policy() -> SyncPolicy {
    SyncPolicy {
        height_mismatch_backoff: Duration::ZERO,
        error_backoff: Duration::ZERO,
        settle_delay: Duration::ZERO,
        ..SyncPolicy::default()
    }
}

pub fn wallet_config(data_dir: &Path) -> WalletConfig {
    WalletConfig {
        cli_path: "zingo-cli".to_string(),
        data_dir: data_dir.to_path_buf(),
        server_uri: "http://localhost:9067".to_string(),
        chain: "regtest".to_string(),
        strategy: ExecStrategy::Direct,
        query_timeout: Duration::from_secs(5),
    }
}

/// Wallet client over `runner` with its ledger in `data_dir`
pub fn wallet_client(runner: Arc<ScriptedRunner>, data_dir: &Path) -> WalletClient {
    let ledger = TransactionLedger::open(data_dir).expect("open ledger");
    WalletClient::new(runner, wallet_config(data_dir), instant_policy(), ledger)
}

/// Serve a fake node on a loopback port and return its URL.
///
/// `getblockcount` answers `height`; `validateaddress` accepts exactly the
/// addresses in `valid`.
pub async fn fake_node(height: Value, valid: &[&str]) -> String {
    let valid: Vec<String> = valid.iter().map(|a| a.to_string()).collect();
    let app = Router::new().route(
        "/",
        post(move |Json(request): Json<Value>| {
            let height = height.clone();
            let valid = valid.clone();
            async move {
                let result = match request["method"].as_str() {
                    Some("getblockcount") => height,
                    Some("validateaddress") => {
                        let address = request["params"][0].as_str().unwrap_or_default();
                        json!({ "isvalid": valid.iter().any(|v| v == address) })
                    }
                    _ => Value::Null,
                };
                Json(json!({ "jsonrpc": "2.0", "id": request["id"], "result": result, "error": null }))
            }
        }),
    );

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    format!("http://{}/", addr)
}

//! Per-ledger orchestration of the transaction stages
//!
//! Each pipeline owns its stages and runs them strictly in sequence:
//! fee or nonce/gas discovery, construction, signing, broadcast.
//! A failure at any stage ends the request; nothing is retried.

pub mod account;
pub mod utxo;

pub use account::{AccountPipeline, SyncStatus};
pub use utxo::{TransferOrder, UtxoPipeline};

use crate::error::GatewayResult;
use crate::metrics;

use std::future::Future;
use std::time::Instant;

/// Run one stage, recording its latency and outcome
pub(crate) async fn observe<T, F>(ledger: &str, stage: &str, stage_future: F) -> GatewayResult<T>
where
    F: Future<Output = GatewayResult<T>>,
{
    let started = Instant::now();
    let result = stage_future.await;
    metrics::record_stage(
        ledger,
        stage,
        started.elapsed().as_secs_f64(),
        result.as_ref().err(),
    );
    result
}

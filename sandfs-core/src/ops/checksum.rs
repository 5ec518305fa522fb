//! Streaming checksums over bounded readers.

use std::path::Path;

use md5::Md5;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256, Sha512};
use tokio::io::AsyncReadExt;
use tokio_util::sync::CancellationToken;

use crate::batch::parallel_map;
use crate::cancel::OperationSignal;
use crate::config::limits;
use crate::error::{ErrorEnvelope, ServiceError, ServiceResult};
use crate::path::validate_existing_path;

use super::{BatchSummary, FsService, ensure_file};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChecksumAlgorithm {
    Md5,
    #[default]
    Sha256,
    Sha512,
}

impl ChecksumAlgorithm {
    pub fn digest_hex_len(self) -> usize {
        match self {
            Self::Md5 => 32,
            Self::Sha256 => 64,
            Self::Sha512 => 128,
        }
    }
}

enum Hasher {
    Md5(Md5),
    Sha256(Sha256),
    Sha512(Sha512),
}

impl Hasher {
    fn new(algorithm: ChecksumAlgorithm) -> Self {
        match algorithm {
            ChecksumAlgorithm::Md5 => Self::Md5(Md5::new()),
            ChecksumAlgorithm::Sha256 => Self::Sha256(Sha256::new()),
            ChecksumAlgorithm::Sha512 => Self::Sha512(Sha512::new()),
        }
    }

    fn update(&mut self, data: &[u8]) {
        match self {
            Self::Md5(h) => h.update(data),
            Self::Sha256(h) => h.update(data),
            Self::Sha512(h) => h.update(data),
        }
    }

    fn finalize_hex(self) -> String {
        match self {
            Self::Md5(h) => hex::encode(h.finalize()),
            Self::Sha256(h) => hex::encode(h.finalize()),
            Self::Sha512(h) => hex::encode(h.finalize()),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct ChecksumRequest {
    pub paths: Vec<String>,
    #[serde(default)]
    pub algorithm: ChecksumAlgorithm,
    pub timeout_ms: Option<u64>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ChecksumEntry {
    pub path: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub digest: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub size: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<ErrorEnvelope>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ChecksumResponse {
    pub algorithm: ChecksumAlgorithm,
    pub entries: Vec<ChecksumEntry>,
    pub summary: BatchSummary,
}

/// Hash a file in streaming chunks, bounded by the read size cap.
async fn hash_file(
    path: &Path,
    algorithm: ChecksumAlgorithm,
    cap: u64,
    signal: &OperationSignal,
) -> ServiceResult<(String, u64)> {
    let mut file = tokio::fs::File::open(path)
        .await
        .map_err(|e| ServiceError::from_io(e, path))?;
    let size = file
        .metadata()
        .await
        .map_err(|e| ServiceError::from_io(e, path))?
        .len();
    if size > cap {
        return Err(ServiceError::too_large(path, size, cap));
    }

    let mut hasher = Hasher::new(algorithm);
    let mut chunk = vec![0u8; 64 * 1024];
    let mut total: u64 = 0;
    loop {
        signal.ensure_live()?;
        let n = file
            .read(&mut chunk)
            .await
            .map_err(|e| ServiceError::from_io(e, path))?;
        if n == 0 {
            break;
        }
        total += n as u64;
        hasher.update(&chunk[..n]);
    }
    Ok((hasher.finalize_hex(), total))
}

impl FsService {
    pub async fn checksum(
        &self,
        request: ChecksumRequest,
        cancel: Option<CancellationToken>,
    ) -> ServiceResult<ChecksumResponse> {
        if request.paths.is_empty() {
            return Err(ServiceError::invalid_input("At least one path is required"));
        }

        let (signal, _guard) = self.signal_for(request.timeout_ms, cancel);
        let algorithm = request.algorithm;
        let cap = limits().max_file_size;

        let service = self.clone();
        let work_signal = signal.clone();
        let results = parallel_map(
            request.paths.clone(),
            limits().parallel_concurrency,
            &signal,
            move |_, path| {
                let service = service.clone();
                let signal = work_signal.clone();
                async move {
                    let resolved =
                        validate_existing_path(service.roots(), &path, &signal).await?;
                    ensure_file(&resolved).await?;
                    hash_file(&resolved.resolved, algorithm, cap, &signal).await
                }
            },
        )
        .await;

        let mut summary = BatchSummary {
            total: request.paths.len(),
            ..BatchSummary::default()
        };
        let entries = request
            .paths
            .into_iter()
            .zip(results)
            .map(|(path, result)| match result {
                Ok((digest, size)) => {
                    summary.succeeded += 1;
                    ChecksumEntry {
                        path,
                        digest: Some(digest),
                        size: Some(size),
                        error: None,
                    }
                }
                Err(error) => {
                    summary.failed += 1;
                    ChecksumEntry {
                        path,
                        digest: None,
                        size: None,
                        error: Some(error.to_envelope()),
                    }
                }
            })
            .collect();

        Ok(ChecksumResponse {
            algorithm,
            entries,
            summary,
        })
    }
}

//! 클라이언트 역할
//!
//! 파일을 업로드하고 서버가 돌려보낸 사본을 받아 원본과 비교한다.

use std::fs;
use std::net::{SocketAddr, ToSocketAddrs};
use std::path::{Path, PathBuf};

use tracing::{info, warn};

use crate::protocol::AlternatingBit;
use crate::session::{file_digest, FileTransfer, TransferSummary};
use crate::stats::TransferStats;
use crate::{Config, Error, Result};

/// 호스트 이름 해석 (IPv4 우선)
pub fn resolve(host: &str, port: u16) -> Result<SocketAddr> {
    let addrs: Vec<SocketAddr> = (host, port)
        .to_socket_addrs()
        .map_err(|e| Error::UnresolvedAddress(format!("{host}:{port}: {e}")))?
        .collect();

    addrs
        .iter()
        .find(|addr| addr.is_ipv4())
        .or_else(|| addrs.first())
        .copied()
        .ok_or_else(|| Error::UnresolvedAddress(format!("{host}:{port}")))
}

/// 두 경로가 같은 파일을 가리키는지 (존재하지 않는 경로는 다른 파일로 봄)
fn is_same_file(a: &Path, b: &Path) -> bool {
    match (fs::canonicalize(a), fs::canonicalize(b)) {
        (Ok(a), Ok(b)) => a == b,
        _ => false,
    }
}

/// 클라이언트 세션 결과
#[derive(Debug, Clone)]
pub struct ClientReport {
    pub uploaded: TransferSummary,
    pub downloaded: TransferSummary,
    pub download_path: PathBuf,
    pub stats: TransferStats,
}

/// 업로드 후 에코를 받는 클라이언트
pub struct Client {
    engine: AlternatingBit,
    server: SocketAddr,
    save_dir: PathBuf,
    linger_rounds: u32,
}

impl Client {
    /// 서버 주소와 같은 주소 체계의 임시 포트에 바인드
    pub fn connect(config: &Config, server: SocketAddr, save_dir: impl Into<PathBuf>) -> Result<Self> {
        let local: SocketAddr = if server.is_ipv4() {
            ([0u8; 4], 0).into()
        } else {
            ([0u16; 8], 0).into()
        };

        Ok(Self::with_engine(
            AlternatingBit::bind(local, config)?,
            server,
            save_dir,
            config.linger_rounds,
        ))
    }

    pub fn with_engine(
        engine: AlternatingBit,
        server: SocketAddr,
        save_dir: impl Into<PathBuf>,
        linger_rounds: u32,
    ) -> Self {
        Self {
            engine,
            server,
            save_dir: save_dir.into(),
            linger_rounds,
        }
    }

    pub fn local_addr(&self) -> Result<SocketAddr> {
        self.engine.local_addr()
    }

    /// 업로드 → 에코 다운로드 → 검증
    pub fn run(mut self, filepath: &Path) -> Result<ClientReport> {
        let file_name = filepath
            .file_name()
            .ok_or_else(|| Error::InvalidFilename(filepath.display().to_string()))?;
        let download_path = self.save_dir.join(file_name);
        if is_same_file(filepath, &download_path) {
            warn!("원본 파일을 덮어쓰는 다운로드 거부: {}", download_path.display());
            return Err(Error::DownloadOverwritesSource {
                path: download_path,
            });
        }
        let source = file_digest(filepath)?;

        info!("업로드 시작: {} -> {}", filepath.display(), self.server);
        let uploaded = FileTransfer::new(&mut self.engine).send_file(filepath, self.server)?;

        info!("에코 수신 시작: {}", download_path.display());
        let downloaded =
            FileTransfer::new(&mut self.engine).receive_file(&download_path, self.server, false)?;

        // 마지막 ACK가 손실됐을 때 서버의 EOF 재전송에 응답
        if let Err(e) = self.engine.linger(self.linger_rounds) {
            warn!("종료 대기 중 에러 무시: {}", e);
        }

        let echo = file_digest(&download_path)?;
        if echo != source {
            warn!(
                "왕복 결과 불일치: 원본 {} bytes (crc {:08X}), 수신 {} bytes (crc {:08X})",
                source.len, source.crc32, echo.len, echo.crc32
            );
            return Err(Error::RoundTripMismatch {
                path: download_path,
            });
        }

        let stats = self.engine.stats().clone();
        info!("왕복 검증 완료: {} bytes", echo.len);
        info!("{}", stats.summary());

        Ok(ClientReport {
            uploaded,
            downloaded,
            download_path,
            stats,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resolve_prefers_ipv4() {
        let addr = resolve("localhost", 8888).unwrap();
        assert!(addr.is_ipv4());
        assert_eq!(addr.port(), 8888);
    }

    #[test]
    fn test_is_same_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("a.txt");
        fs::write(&path, b"a").unwrap();

        assert!(is_same_file(&path, &dir.path().join(".").join("a.txt")));
        assert!(!is_same_file(&path, &dir.path().join("b.txt")));
    }

    #[test]
    fn test_resolve_literal() {
        assert_eq!(
            resolve("127.0.0.1", 9000).unwrap(),
            "127.0.0.1:9000".parse::<SocketAddr>().unwrap()
        );
    }
}

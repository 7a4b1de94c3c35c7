//! 서버 역할
//!
//! 첫 SOF를 보낸 클라이언트 하나의 파일을 받아 저장하고, 같은 파일을 그대로
//! 돌려보낸 뒤 종료한다.

use std::net::{SocketAddr, ToSocketAddrs};
use std::path::PathBuf;

use tracing::{info, trace, warn};

use crate::packet::{Packet, Tag};
use crate::protocol::{AlternatingBit, Inbound};
use crate::session::{FileTransfer, TransferSummary};
use crate::stats::TransferStats;
use crate::{Config, Error, Result};

/// 파일 이름 허용 목록 검사
///
/// ASCII 영문자, 숫자, `.`, `_`, `!`만 허용. 경로 구분자가 들어갈 수 없고
/// `.`/`..`처럼 점으로만 된 이름도 거부한다.
pub fn is_valid_filename(name: &str) -> bool {
    !name.is_empty()
        && name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '!'))
        && !name.chars().all(|c| c == '.')
}

/// 서버 세션 결과
#[derive(Debug, Clone)]
pub struct ServerReport {
    pub peer: SocketAddr,
    pub received: TransferSummary,
    pub sent: TransferSummary,
    pub stats: TransferStats,
}

/// 에코 서버
pub struct Server {
    engine: AlternatingBit,
    save_dir: PathBuf,
}

impl Server {
    /// 로컬 주소에 바인드
    pub fn bind(config: &Config, addr: impl ToSocketAddrs, save_dir: impl Into<PathBuf>) -> Result<Self> {
        Ok(Self::with_engine(AlternatingBit::bind(addr, config)?, save_dir))
    }

    /// 이미 만든 엔진으로 서버 생성 (손실 모델을 직접 고를 때)
    pub fn with_engine(engine: AlternatingBit, save_dir: impl Into<PathBuf>) -> Self {
        Self {
            engine,
            save_dir: save_dir.into(),
        }
    }

    pub fn local_addr(&self) -> Result<SocketAddr> {
        self.engine.local_addr()
    }

    /// 클라이언트 하나를 처리하고 종료
    pub fn serve(mut self) -> Result<ServerReport> {
        info!("서버 대기 중: {}", self.local_addr()?);
        let (sof, peer) = self.wait_for_sof()?;

        let file_name = match std::str::from_utf8(sof.payload()) {
            Ok(name) if is_valid_filename(name) => name.to_string(),
            _ => {
                let name = String::from_utf8_lossy(sof.payload()).into_owned();
                warn!("유효하지 않은 파일 이름 거부: {:?} <- {}", name, peer);
                self.engine.send_error(peer)?;
                return Err(Error::InvalidFilename(name));
            }
        };

        info!("파일 전송 대화 시작: {} <- {}", file_name, peer);
        self.engine.accept(&sof, peer)?;

        let path = self.save_dir.join(&file_name);
        let received = FileTransfer::new(&mut self.engine).receive_file(&path, peer, true)?;

        info!("파일 돌려보내는 중: {}", path.display());
        let sent = FileTransfer::new(&mut self.engine).send_file(&path, peer)?;

        let stats = self.engine.stats().clone();
        info!("{}", stats.summary());

        Ok(ServerReport {
            peer,
            received,
            sent,
            stats,
        })
    }

    /// 아무 주소에서나 오는 유효한 첫 SOF를 기다림 (무제한)
    fn wait_for_sof(&mut self) -> Result<(Packet, SocketAddr)> {
        let timeout = self.engine.timeout();
        loop {
            match self.engine.poll(timeout)? {
                Inbound::Silence => trace!("데이터 대기 중..."),
                Inbound::Frame(packet, from) => {
                    if packet.tag() == Tag::Sof
                        && packet.identifier() == self.engine.expected_identifier()
                        && packet.verify()
                    {
                        return Ok((packet, from));
                    }
                    warn!("대화 시작 프레임이 아님, 무시: {} <- {}", packet, from);
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_valid_filenames() {
        for name in ["hello.txt", "a", "data_01.bin", "wow!.md", ".hidden", "..a"] {
            assert!(is_valid_filename(name), "{name}");
        }
    }

    #[test]
    fn test_invalid_filenames() {
        for name in [
            "",
            ".",
            "..",
            "../etc/passwd",
            "dir/file",
            "dir\\file",
            "with space",
            "naïve.txt",
            "semi;colon",
        ] {
            assert!(!is_valid_filename(name), "{name}");
        }
    }
}

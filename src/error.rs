//! 에러 타입 정의

use std::net::SocketAddr;
use std::path::PathBuf;

use thiserror::Error;

/// ABP 프로토콜 에러 타입
#[derive(Error, Debug)]
pub enum Error {
    #[error("IO 에러: {0}")]
    Io(#[from] std::io::Error),

    /// 디코딩할 수 없는 프레임. 수신 실패(타임아웃)와 동일하게 취급됨
    #[error("잘못된 프레임: {len} bytes")]
    MalformedFrame { len: usize },

    #[error("페이로드 크기 초과: 최대 {max} bytes, got {len} bytes")]
    PayloadTooLarge { len: usize, max: usize },

    #[error("지원하지 않는 태그: {0}")]
    UnsupportedTag(u8),

    #[error("프로토콜 위반: {0}")]
    ProtocolViolation(String),

    #[error("상대가 응답하지 않음: {addr}, {attempts}회 시도")]
    PeerUnresponsive { addr: SocketAddr, attempts: u32 },

    #[error("수신 타임아웃: {attempts}회 시도")]
    ReceiveTimeout { attempts: u32 },

    #[error("다중 연결은 지원하지 않음: bound {bound}, got {got}")]
    MultiplePeers { bound: SocketAddr, got: SocketAddr },

    #[error("유효하지 않은 파일 이름: {0:?}")]
    InvalidFilename(String),

    #[error("잘못된 설정: {0}")]
    InvalidConfig(String),

    #[error("주소를 해석할 수 없음: {0}")]
    UnresolvedAddress(String),

    #[error("다운로드 경로가 원본 파일과 같음: {path}")]
    DownloadOverwritesSource { path: PathBuf },

    #[error("왕복 전송 결과 불일치: {path}")]
    RoundTripMismatch { path: PathBuf },
}

impl Error {
    /// 재시도 예산 안에서 복구 가능한 에러인지 여부
    pub fn is_transient(&self) -> bool {
        matches!(self, Error::MalformedFrame { .. })
    }
}

/// Result 타입 별칭
pub type Result<T> = std::result::Result<T, Error>;

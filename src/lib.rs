//! # ABP (Alternating Bit Protocol)
//!
//! 손실이 있는 UDP 위의 stop-and-wait 파일 전송 프로토콜
//!
//! ## 핵심 특징
//! - **고정 크기 프레임**: 6바이트 헤더 + 최대 58바이트 페이로드, CRC-32 체크섬
//! - **교대 비트 ARQ**: 미확인 프레임은 항상 하나, 1비트 시퀀스로 중복 구분
//! - **손실 시뮬레이션**: 송신 프레임 손실/중복을 주입 가능한 모델로 결정
//! - **에코 세션**: 서버는 받은 파일을 같은 상대에게 그대로 돌려보냄
//!
//! ```text
//! Server / Client
//!   └─ FileTransfer      (SOF → DATA… → EOF)
//!        └─ AlternatingBit   (safe_send / safe_receive)
//!             └─ UnreliableTransport  (UdpSocket + FaultModel)
//!                  └─ Packet  (encode / decode / verify)
//! ```

pub mod client;
pub mod config;
pub mod error;
pub mod fault;
pub mod packet;
pub mod protocol;
pub mod server;
pub mod session;
pub mod stats;
pub mod transport;

use std::time::Duration;

pub use client::{Client, ClientReport};
pub use config::Config;
pub use error::{Error, Result};
pub use fault::{Fate, FaultModel, FaultPattern, RandomFaults, Reliable};
pub use packet::{Identifier, Packet, Tag};
pub use protocol::AlternatingBit;
pub use server::{is_valid_filename, Server, ServerReport};
pub use session::{FileTransfer, TransferSummary};
pub use stats::TransferStats;
pub use transport::UnreliableTransport;

/// 프레임 최대 크기 (바이트)
pub const MAX_FRAME_SIZE: usize = 64;

/// 헤더 크기: identifier(1) + tag(1) + checksum(4)
pub const HEADER_SIZE: usize = 6;

/// 프레임 하나에 실을 수 있는 최대 페이로드
pub const MAX_DATA_SIZE: usize = MAX_FRAME_SIZE - HEADER_SIZE;

/// 기본 포트
pub const DEFAULT_PORT: u16 = 8888;

/// 기본 최대 시도 횟수
pub const DEFAULT_MAX_ATTEMPTS: u32 = 200;

/// 기본 응답 대기 타임아웃
pub const DEFAULT_TIMEOUT: Duration = Duration::from_millis(100);

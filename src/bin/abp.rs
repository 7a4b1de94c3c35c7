//! ABP 에코 전송 - Alternating Bit Protocol
//!
//! 서버는 클라이언트 하나의 파일을 받아 저장한 뒤 그대로 돌려보낸다.
//! 클라이언트는 파일을 올리고 돌아온 사본을 원본과 비교한다.
//!
//! 사용법:
//!   cargo run --release --bin abp -- <server|client> <save_dir> [OPTIONS]
//!
//! 예시:
//!   # 서버 (기본 127.0.0.1:8888)
//!   cargo run --release --bin abp -- server ./server_files
//!
//!   # 클라이언트 (손실 30%)
//!   cargo run --release --bin abp -- client ./client_files \
//!       --server_address localhost --filepath hello.txt
//!
//!   # 손실 없이, 상세 로그
//!   RUST_LOG=debug cargo run --bin abp -- client ./out --server_address 127.0.0.1 \
//!       --filepath data.bin --loss_rate 0

use std::fs;
use std::path::PathBuf;
use std::time::Duration;

use clap::{Parser, ValueEnum};
use tracing::info;
use tracing_subscriber::EnvFilter;

use abp::client::resolve;
use abp::{Client, Config, Error, Server, DEFAULT_MAX_ATTEMPTS, DEFAULT_PORT, DEFAULT_TIMEOUT};

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum Mode {
    Server,
    Client,
}

#[derive(Debug, Parser)]
#[command(name = "abp")]
#[command(about = "Alternating Bit Protocol file echo over lossy UDP")]
struct Cli {
    /// 실행 역할
    #[arg(value_enum)]
    mode: Mode,

    /// 받은 파일을 저장할 디렉터리 (없으면 생성)
    save_dir: PathBuf,

    /// 클라이언트: 서버 호스트 (필수), 서버: 바인드 호스트
    #[arg(long = "server_address")]
    server_address: Option<String>,

    #[arg(long, default_value_t = DEFAULT_PORT)]
    port: u16,

    /// 업로드할 파일 (클라이언트 전용)
    #[arg(long)]
    filepath: Option<PathBuf>,

    /// 프레임 하나당 최대 시도 횟수
    #[arg(long = "max_attempts", default_value_t = DEFAULT_MAX_ATTEMPTS)]
    max_attempts: u32,

    /// 응답 대기 타임아웃 (초)
    #[arg(long, default_value_t = DEFAULT_TIMEOUT.as_secs_f64())]
    timeout: f64,

    /// 송신 프레임 손실 확률
    #[arg(long = "loss_rate", default_value_t = Config::default().loss_rate)]
    loss_rate: f64,

    /// 송신 프레임 중복 확률
    #[arg(long = "duplicate_rate", default_value_t = Config::default().duplicate_rate)]
    duplicate_rate: f64,

    /// 손실 시뮬레이션 시드
    #[arg(long)]
    seed: Option<u64>,

    /// 종료 전 재전송에 응답하며 기다릴 구간 수
    #[arg(long = "linger_rounds", default_value_t = Config::default().linger_rounds)]
    linger_rounds: u32,
}

impl Cli {
    fn config(&self) -> abp::Result<Config> {
        let timeout = Duration::try_from_secs_f64(self.timeout)
            .map_err(|e| Error::InvalidConfig(format!("timeout {}: {e}", self.timeout)))?;

        let config = Config {
            max_attempts: self.max_attempts,
            timeout,
            loss_rate: self.loss_rate,
            duplicate_rate: self.duplicate_rate,
            seed: self.seed,
            linger_rounds: self.linger_rounds,
        };
        config.validate()?;
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_defaults_match_config() {
        let cli = Cli::try_parse_from(["abp", "server", "out"]).unwrap();
        let config = cli.config().unwrap();
        let default = Config::default();

        assert_eq!(cli.port, DEFAULT_PORT);
        assert_eq!(config.max_attempts, default.max_attempts);
        assert_eq!(config.timeout, default.timeout);
        assert_eq!(config.loss_rate, default.loss_rate);
        assert_eq!(config.duplicate_rate, default.duplicate_rate);
        assert_eq!(config.seed, default.seed);
        assert_eq!(config.linger_rounds, default.linger_rounds);
    }

    #[test]
    fn test_cli_rejects_negative_timeout() {
        let cli = Cli::try_parse_from(["abp", "client", "out", "--timeout=-1"]).unwrap();
        assert!(matches!(cli.config(), Err(Error::InvalidConfig(_))));
    }
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    // 로깅 설정 (RUST_LOG로 조정)
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();
    let config = cli.config()?;
    fs::create_dir_all(&cli.save_dir)?;

    info!(
        "설정: max_attempts={}, timeout={:?}, loss={:.1}%, dup={:.1}%",
        config.max_attempts,
        config.timeout,
        config.loss_rate * 100.0,
        config.duplicate_rate * 100.0
    );

    match cli.mode {
        Mode::Server => {
            let host = cli.server_address.as_deref().unwrap_or("127.0.0.1");
            let addr = resolve(host, cli.port)?;
            let report = Server::bind(&config, addr, cli.save_dir.clone())?.serve()?;
            info!(
                "서버 종료: {} ({} bytes 수신, {} bytes 송신)",
                report.peer, report.received.bytes, report.sent.bytes
            );
        }
        Mode::Client => {
            let host = cli
                .server_address
                .as_deref()
                .ok_or("client 모드에는 --server_address가 필요함")?;
            let filepath = cli
                .filepath
                .as_deref()
                .ok_or("client 모드에는 --filepath가 필요함")?;
            let server = resolve(host, cli.port)?;

            let report = Client::connect(&config, server, cli.save_dir.clone())?.run(filepath)?;
            info!(
                "왕복 성공: {} -> {} ({} bytes)",
                filepath.display(),
                report.download_path.display(),
                report.downloaded.bytes
            );
        }
    }

    Ok(())
}

//! 프로토콜 설정

use std::time::Duration;

use crate::fault::{FaultModel, RandomFaults, Reliable};
use crate::{Error, Result, DEFAULT_MAX_ATTEMPTS, DEFAULT_TIMEOUT};

/// ABP 프로토콜 설정
#[derive(Debug, Clone)]
pub struct Config {
    /// 프레임 하나당 최대 시도 횟수
    pub max_attempts: u32,

    /// 응답 대기 타임아웃 (시도 1회)
    pub timeout: Duration,

    /// 송신 프레임 손실 확률 (0.0 ~ 1.0, 시뮬레이션 전용)
    pub loss_rate: f64,

    /// 송신 프레임 중복 확률 (0.0 ~ 1.0, 시뮬레이션 전용)
    pub duplicate_rate: f64,

    /// 손실 시뮬레이션 RNG 시드 (None이면 엔트로피 사용)
    pub seed: Option<u64>,

    /// 마지막 ACK 이후 재전송에 응답하며 기다릴 조용한 구간 수
    pub linger_rounds: u32,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            timeout: DEFAULT_TIMEOUT,
            loss_rate: 0.3,
            duplicate_rate: 0.0,
            seed: None,
            linger_rounds: 10,
        }
    }
}

impl Config {
    /// 손실 시뮬레이션 없는 설정
    pub fn reliable() -> Self {
        Self {
            loss_rate: 0.0,
            duplicate_rate: 0.0,
            ..Self::default()
        }
    }

    /// 불안정한 네트워크용 설정
    pub fn unstable_network() -> Self {
        Self {
            max_attempts: 500,
            timeout: Duration::from_millis(200),
            loss_rate: 0.5,
            duplicate_rate: 0.1,
            seed: None,
            linger_rounds: 20,
        }
    }

    /// 설정 검증
    pub fn validate(&self) -> Result<()> {
        if self.max_attempts == 0 {
            return Err(Error::InvalidConfig("max_attempts는 1 이상이어야 함".into()));
        }
        if self.timeout.is_zero() {
            return Err(Error::InvalidConfig("timeout은 0보다 커야 함".into()));
        }
        for (name, rate) in [
            ("loss_rate", self.loss_rate),
            ("duplicate_rate", self.duplicate_rate),
        ] {
            if !(0.0..1.0).contains(&rate) {
                return Err(Error::InvalidConfig(format!(
                    "{name}는 [0, 1) 범위여야 함: {rate}"
                )));
            }
        }
        if self.loss_rate + self.duplicate_rate > 1.0 {
            return Err(Error::InvalidConfig(
                "loss_rate + duplicate_rate는 1 이하여야 함".into(),
            ));
        }
        Ok(())
    }

    /// 전송 계층에 넣을 손실 모델 생성
    pub fn fault_model(&self) -> Box<dyn FaultModel> {
        if self.loss_rate == 0.0 && self.duplicate_rate == 0.0 {
            return Box::new(Reliable);
        }
        match self.seed {
            Some(seed) => Box::new(RandomFaults::seeded(
                self.loss_rate,
                self.duplicate_rate,
                seed,
            )),
            None => Box::new(RandomFaults::from_entropy(
                self.loss_rate,
                self.duplicate_rate,
            )),
        }
    }
}

//! 송신 프레임 손실/중복 시뮬레이션
//!
//! 전송 계층은 프레임을 보낼 때마다 [`FaultModel`]에 운명을 묻는다.
//! 테스트에서는 [`FaultPattern`]으로 결정적인 손실 시퀀스를 주입한다.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

/// 송신 프레임 하나의 운명
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Fate {
    Deliver,
    /// 전송하지 않고 버림
    Drop,
    /// 두 번 전송
    Duplicate,
}

/// 손실 결정 소스
pub trait FaultModel: Send {
    fn next_fate(&mut self) -> Fate;
}

/// 손실 없음
#[derive(Debug, Clone, Copy, Default)]
pub struct Reliable;

impl FaultModel for Reliable {
    fn next_fate(&mut self) -> Fate {
        Fate::Deliver
    }
}

/// 확률 기반 손실/중복
#[derive(Debug)]
pub struct RandomFaults<R = StdRng> {
    loss_rate: f64,
    duplicate_rate: f64,
    rng: R,
}

impl RandomFaults<StdRng> {
    /// 시드 고정 (재현 가능)
    pub fn seeded(loss_rate: f64, duplicate_rate: f64, seed: u64) -> Self {
        Self::with_rng(loss_rate, duplicate_rate, StdRng::seed_from_u64(seed))
    }

    /// OS 엔트로피로 시드
    pub fn from_entropy(loss_rate: f64, duplicate_rate: f64) -> Self {
        Self::with_rng(loss_rate, duplicate_rate, StdRng::from_entropy())
    }
}

impl<R: Rng> RandomFaults<R> {
    pub fn with_rng(loss_rate: f64, duplicate_rate: f64, rng: R) -> Self {
        Self {
            loss_rate: loss_rate.clamp(0.0, 1.0),
            duplicate_rate: duplicate_rate.clamp(0.0, 1.0),
            rng,
        }
    }
}

impl<R: Rng + Send> FaultModel for RandomFaults<R> {
    fn next_fate(&mut self) -> Fate {
        let roll: f64 = self.rng.gen();
        if roll < self.loss_rate {
            Fate::Drop
        } else if roll < self.loss_rate + self.duplicate_rate {
            Fate::Duplicate
        } else {
            Fate::Deliver
        }
    }
}

/// 순환하는 고정 운명 시퀀스
#[derive(Debug, Clone)]
pub struct FaultPattern {
    fates: Vec<Fate>,
    cursor: usize,
}

impl FaultPattern {
    pub fn new(fates: Vec<Fate>) -> Self {
        Self { fates, cursor: 0 }
    }

    /// n번째 프레임마다 버림 (n == 0이면 손실 없음)
    pub fn drop_every(n: usize) -> Self {
        Self::every(n, Fate::Drop)
    }

    /// n번째 프레임마다 두 번 전송
    pub fn duplicate_every(n: usize) -> Self {
        Self::every(n, Fate::Duplicate)
    }

    fn every(n: usize, fate: Fate) -> Self {
        if n == 0 {
            return Self::new(Vec::new());
        }
        let mut fates = vec![Fate::Deliver; n];
        fates[n - 1] = fate;
        Self::new(fates)
    }
}

impl FaultModel for FaultPattern {
    fn next_fate(&mut self) -> Fate {
        if self.fates.is_empty() {
            return Fate::Deliver;
        }
        let fate = self.fates[self.cursor];
        self.cursor = (self.cursor + 1) % self.fates.len();
        fate
    }
}

//! 전송 통계

use std::time::{Duration, Instant};

use crate::fault::Fate;

/// ARQ 엔진 전송 통계
#[derive(Debug, Clone)]
pub struct TransferStats {
    /// 시작 시간
    pub start_time: Instant,

    /// 성공한 교환 수 (ACK 받은 송신 + 수락한 수신)
    pub exchanges: u64,

    /// 송신 시도한 프레임 수 (ACK/ERROR 포함, 시뮬레이션 손실 포함)
    pub frames_sent: u64,

    /// 시뮬레이션으로 버려진 프레임 수
    pub frames_dropped: u64,

    /// 시뮬레이션으로 중복 전송된 프레임 수
    pub frames_duplicated: u64,

    /// 재전송 수
    pub retransmissions: u64,

    /// 응답 없이 끝난 대기 구간 수
    pub timeouts: u64,

    /// 디코딩 실패 프레임 수
    pub malformed_frames: u64,

    /// 다시 ACK한 중복 프레임 수
    pub duplicates_acked: u64,

    /// 무시한 오래된 응답 수
    pub stale_replies: u64,

    /// 수락한 프레임의 페이로드 바이트
    pub payload_bytes_received: u64,

    /// ACK 받은 프레임의 페이로드 바이트
    pub payload_bytes_sent: u64,
}

impl TransferStats {
    pub fn new() -> Self {
        Self {
            start_time: Instant::now(),
            exchanges: 0,
            frames_sent: 0,
            frames_dropped: 0,
            frames_duplicated: 0,
            retransmissions: 0,
            timeouts: 0,
            malformed_frames: 0,
            duplicates_acked: 0,
            stale_replies: 0,
            payload_bytes_received: 0,
            payload_bytes_sent: 0,
        }
    }

    /// 송신 결과 기록
    pub fn record_send(&mut self, fate: Fate) {
        self.frames_sent += 1;
        match fate {
            Fate::Deliver => {}
            Fate::Drop => self.frames_dropped += 1,
            Fate::Duplicate => self.frames_duplicated += 1,
        }
    }

    /// 경과 시간
    pub fn elapsed(&self) -> Duration {
        self.start_time.elapsed()
    }

    /// 시뮬레이션 손실률
    pub fn drop_rate(&self) -> f64 {
        if self.frames_sent == 0 {
            return 0.0;
        }
        self.frames_dropped as f64 / self.frames_sent as f64
    }

    /// 교환당 재전송 비율
    pub fn retransmission_ratio(&self) -> f64 {
        if self.exchanges == 0 {
            return 0.0;
        }
        self.retransmissions as f64 / self.exchanges as f64
    }

    /// 통계 요약 문자열
    pub fn summary(&self) -> String {
        format!(
            "Elapsed: {:.2}s | Exchanges: {} | Sent: {} ({} dropped, {} duplicated) | Retransmits: {} | Timeouts: {} | Dup ACKs: {} | Stale: {} | Bytes: {} out / {} in",
            self.elapsed().as_secs_f64(),
            self.exchanges,
            self.frames_sent,
            self.frames_dropped,
            self.frames_duplicated,
            self.retransmissions,
            self.timeouts,
            self.duplicates_acked,
            self.stale_replies,
            self.payload_bytes_sent,
            self.payload_bytes_received,
        )
    }
}

impl Default for TransferStats {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_record_send() {
        let mut stats = TransferStats::new();
        stats.record_send(Fate::Deliver);
        stats.record_send(Fate::Drop);
        stats.record_send(Fate::Duplicate);
        stats.record_send(Fate::Drop);

        assert_eq!(stats.frames_sent, 4);
        assert_eq!(stats.frames_dropped, 2);
        assert_eq!(stats.frames_duplicated, 1);
        assert_eq!(stats.drop_rate(), 0.5);
    }

    #[test]
    fn test_ratios_without_traffic() {
        let stats = TransferStats::default();
        assert_eq!(stats.drop_rate(), 0.0);
        assert_eq!(stats.retransmission_ratio(), 0.0);
        assert!(stats.summary().contains("Exchanges: 0"));
    }
}

//! 교대 비트 (stop-and-wait) ARQ 엔진
//!
//! 한 번에 프레임 하나만 미확인 상태로 둔다. 신뢰성은 재전송과 1비트
//! 시퀀스 번호로 얻는다. 수신측은 이 비트로 새 프레임과 이전 라운드의
//! 재전송을 구분하고, 송신측은 새 ACK와 오래된 ACK를 구분한다.
//!
//! 엔진 하나는 상대 하나만 상대한다. 첫 접촉에서 상대 주소가 고정되고,
//! 다른 주소에서 온 프레임은 [`Error::MultiplePeers`]로 세션을 끝낸다.

use std::net::{SocketAddr, ToSocketAddrs};
use std::time::{Duration, Instant};

use bytes::Bytes;
use tracing::{debug, trace, warn};

use crate::packet::{Identifier, Packet, Tag};
use crate::stats::TransferStats;
use crate::transport::UnreliableTransport;
use crate::{Config, Error, Result};

/// 한 번의 수신 결과
#[derive(Debug)]
pub enum Inbound {
    /// 타임아웃 또는 디코딩 불가 프레임 (재시도 대상)
    Silence,
    Frame(Packet, SocketAddr),
}

/// 수락한 프레임 식별용
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct FrameKey {
    identifier: Identifier,
    tag: Tag,
    checksum: u32,
}

impl FrameKey {
    fn of(packet: &Packet) -> Self {
        Self {
            identifier: packet.identifier(),
            tag: packet.tag(),
            checksum: packet.checksum(),
        }
    }
}

/// 엔진 세션 상태
#[derive(Debug, Clone, Default)]
struct SessionState {
    /// 다음 교환에 쓸 비트
    expected: Identifier,

    /// 고정된 상대 주소
    peer: Option<SocketAddr>,

    last_accepted: Option<FrameKey>,
}

/// ARQ 엔진
pub struct AlternatingBit {
    transport: UnreliableTransport,
    state: SessionState,
    timeout: Duration,
    max_attempts: u32,
    stats: TransferStats,
}

impl AlternatingBit {
    /// 전송 계층 위에 엔진 생성
    pub fn new(transport: UnreliableTransport, config: &Config) -> Self {
        Self {
            transport,
            state: SessionState::default(),
            timeout: config.timeout,
            max_attempts: config.max_attempts,
            stats: TransferStats::new(),
        }
    }

    /// 소켓을 바인드하고 설정의 손실 모델로 엔진 생성
    pub fn bind(addr: impl ToSocketAddrs, config: &Config) -> Result<Self> {
        config.validate()?;
        let transport = UnreliableTransport::bind(addr, config.fault_model())?;
        Ok(Self::new(transport, config))
    }

    pub fn local_addr(&self) -> Result<SocketAddr> {
        self.transport.local_addr()
    }

    pub fn expected_identifier(&self) -> Identifier {
        self.state.expected
    }

    pub fn peer(&self) -> Option<SocketAddr> {
        self.state.peer
    }

    pub fn stats(&self) -> &TransferStats {
        &self.stats
    }

    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// 상대 주소 고정. 이미 다른 주소가 고정되어 있으면 에러
    pub fn bind_peer(&mut self, addr: SocketAddr) -> Result<()> {
        match self.state.peer {
            Some(bound) if bound != addr => Err(Error::MultiplePeers { bound, got: addr }),
            Some(_) => Ok(()),
            None => {
                debug!("상대 고정: {}", addr);
                self.state.peer = Some(addr);
                Ok(())
            }
        }
    }

    /// 현재 비트를 단 패킷 생성
    pub fn packet(&self, tag: Tag, payload: impl Into<Bytes>) -> Result<Packet> {
        Packet::new(self.state.expected, tag, payload)
    }

    /// 비트 반전. 성공한 교환마다 정확히 한 번만 호출됨
    pub fn flip_identifier(&mut self) {
        self.state.expected = self.state.expected.flipped();
        trace!("identifier 반전: {}", self.state.expected);
    }

    /// 상대에게 ERROR 전송
    pub fn send_error(&mut self, addr: SocketAddr) -> Result<()> {
        warn!("ERROR 전송: {}", addr);
        self.transmit(&Packet::error(self.state.expected), addr)
    }

    fn transmit(&mut self, packet: &Packet, addr: SocketAddr) -> Result<()> {
        let fate = self.transport.send(packet, addr)?;
        self.stats.record_send(fate);
        Ok(())
    }

    /// 수신 한 번을 분류
    ///
    /// 디코딩 불가 프레임은 타임아웃과 같이 [`Inbound::Silence`]가 된다.
    /// 고정된 상대가 아닌 주소, 또는 상대의 유효한 ERROR 프레임은 치명적이다.
    pub fn poll(&mut self, timeout: Duration) -> Result<Inbound> {
        let (packet, from) = match self.transport.receive(timeout) {
            Ok(Some(received)) => received,
            Ok(None) => return Ok(Inbound::Silence),
            Err(e) if e.is_transient() => {
                debug!("수신 프레임 무시: {}", e);
                self.stats.malformed_frames += 1;
                return Ok(Inbound::Silence);
            }
            Err(e) => return Err(e),
        };

        if let Some(bound) = self.state.peer {
            if bound != from {
                warn!("다른 주소에서 프레임 수신: {} (bound {})", from, bound);
                return Err(Error::MultiplePeers { bound, got: from });
            }
            if packet.tag() == Tag::Error && packet.verify() {
                warn!("상대가 ERROR 전송: {}", packet);
                return Err(Error::ProtocolViolation(format!(
                    "상대가 세션을 중단함 ({packet})"
                )));
            }
        }

        Ok(Inbound::Frame(packet, from))
    }

    /// 유효한 새 프레임 수락: ACK 전송, 비트 반전
    pub fn accept(&mut self, packet: &Packet, from: SocketAddr) -> Result<()> {
        if packet.identifier() != self.state.expected || !packet.verify() || !packet.tag().is_known()
        {
            return Err(Error::ProtocolViolation(format!(
                "수락할 수 없는 프레임: {packet} (expected #{})",
                self.state.expected
            )));
        }

        self.bind_peer(from)?;
        self.transmit(&Packet::ack(packet.identifier()), from)?;
        self.state.last_accepted = Some(FrameKey::of(packet));
        self.flip_identifier();
        self.stats.exchanges += 1;
        self.stats.payload_bytes_received += packet.payload().len() as u64;
        Ok(())
    }

    fn is_retransmission_of_last_accepted(&self, packet: &Packet) -> bool {
        packet.verify() && self.state.last_accepted == Some(FrameKey::of(packet))
    }

    fn reack(&mut self, packet: &Packet, from: SocketAddr) -> Result<()> {
        debug!("중복 프레임, ACK 재전송: {}", packet);
        self.transmit(&Packet::ack(packet.identifier()), from)?;
        self.stats.duplicates_acked += 1;
        Ok(())
    }

    /// ACK를 받을 때까지 `packet`을 재전송
    ///
    /// 시도 1회 = 전송 1회 + `timeout` 동안 대기. 비트가 다른 응답은 오래된
    /// 교환의 잔재로 보고 버리되, 같은 시도의 대기를 계속한다 (즉시
    /// 재전송하지 않음). 그 응답이 마지막으로 수락한 프레임의 재전송이면
    /// ACK를 다시 보내 상대를 풀어준다.
    pub fn safe_send(&mut self, packet: &Packet, addr: SocketAddr, max_attempts: u32) -> Result<()> {
        self.bind_peer(addr)?;
        let expected = self.state.expected;

        for attempt in 1..=max_attempts {
            if attempt > 1 {
                self.stats.retransmissions += 1;
            }
            debug!("송신 {}/{}: {} -> {}", attempt, max_attempts, packet, addr);
            self.transmit(packet, addr)?;

            let deadline = Instant::now() + self.timeout;
            loop {
                let remaining = deadline.saturating_duration_since(Instant::now());
                if remaining.is_zero() {
                    self.stats.timeouts += 1;
                    break;
                }

                let (reply, from) = match self.poll(remaining)? {
                    Inbound::Silence => continue,
                    Inbound::Frame(reply, from) => (reply, from),
                };

                if reply.identifier() != expected {
                    if self.is_retransmission_of_last_accepted(&reply) {
                        self.reack(&reply, from)?;
                    } else {
                        trace!("오래된 응답 무시: {}", reply);
                        self.stats.stale_replies += 1;
                    }
                    continue;
                }

                match reply.tag() {
                    Tag::Ack if reply.verify() => {
                        self.flip_identifier();
                        self.stats.exchanges += 1;
                        self.stats.payload_bytes_sent += packet.payload().len() as u64;
                        return Ok(());
                    }
                    Tag::Error => {
                        return Err(Error::ProtocolViolation(format!(
                            "상대가 ERROR로 응답함 ({reply})"
                        )));
                    }
                    _ => {
                        warn!("ACK 대신 잘못된 응답 수신: {}", reply);
                        self.send_error(addr)?;
                        return Err(Error::ProtocolViolation(format!(
                            "ACK 대신 {reply} 수신"
                        )));
                    }
                }
            }
        }

        warn!("상대 무응답: {}, {}회 시도", addr, max_attempts);
        Err(Error::PeerUnresponsive {
            addr,
            attempts: max_attempts,
        })
    }

    /// 다음 새 프레임을 받아 ACK하고 반환
    ///
    /// 비트가 다른 프레임은 이미 수락한 프레임의 재전송이다 (상대가 ACK를
    /// 잃어버림). ACK만 다시 보내고 상태는 건드리지 않는다.
    pub fn safe_receive(&mut self, max_attempts: u32) -> Result<(Packet, SocketAddr)> {
        let expected = self.state.expected;

        for attempt in 1..=max_attempts {
            trace!("수신 대기 {}/{}: #{}", attempt, max_attempts, expected);
            let (packet, from) = match self.poll(self.timeout)? {
                Inbound::Silence => {
                    self.stats.timeouts += 1;
                    continue;
                }
                Inbound::Frame(packet, from) => (packet, from),
            };

            if packet.identifier() != expected {
                if packet.verify() && packet.tag() != Tag::Ack {
                    self.reack(&packet, from)?;
                } else {
                    trace!("오래된 프레임 무시: {}", packet);
                    self.stats.stale_replies += 1;
                }
                continue;
            }

            if packet.verify() && packet.tag().is_known() {
                debug!("수신: {} <- {}", packet, from);
                self.accept(&packet, from)?;
                return Ok((packet, from));
            }

            warn!("잘못된 프레임 수신: {}", packet);
            self.send_error(from)?;
            return Err(Error::ProtocolViolation(if packet.verify() {
                format!("지원하지 않는 태그: {packet}")
            } else {
                format!("체크섬 불일치: {packet}")
            }));
        }

        Err(Error::ReceiveTimeout {
            attempts: max_attempts,
        })
    }

    /// 세션 종료 후 대기
    ///
    /// 마지막 ACK가 손실되면 상대는 마지막 프레임을 계속 재전송한다.
    /// `quiet_rounds`번 연속으로 조용할 때까지 그 재전송에 ACK로 응답한다.
    pub fn linger(&mut self, quiet_rounds: u32) -> Result<()> {
        let mut quiet = 0;
        let mut rounds = 0;
        let limit = quiet_rounds.saturating_add(self.max_attempts);

        while quiet < quiet_rounds && rounds < limit {
            rounds += 1;
            match self.poll(self.timeout)? {
                Inbound::Silence => quiet += 1,
                Inbound::Frame(packet, from) => {
                    if self.is_retransmission_of_last_accepted(&packet) {
                        self.reack(&packet, from)?;
                        quiet = 0;
                    } else {
                        trace!("대기 중 프레임 무시: {}", packet);
                        self.stats.stale_replies += 1;
                        quiet += 1;
                    }
                }
            }
        }

        Ok(())
    }
}

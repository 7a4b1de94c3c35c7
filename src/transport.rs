//! 손실이 있는 UDP 전송 계층
//!
//! 블로킹 `std::net::UdpSocket` 위에서 [`Packet`] 단위로 송수신한다.
//! 송신 시 [`FaultModel`]이 정한 대로 프레임을 버리거나 중복 전송한다.

use std::io;
use std::net::{SocketAddr, ToSocketAddrs, UdpSocket};
use std::time::Duration;

use tracing::{debug, trace};

use crate::fault::{Fate, FaultModel};
use crate::packet::Packet;
use crate::{Error, Result, MAX_FRAME_SIZE};

/// 소켓이 허용하는 최소 읽기 타임아웃
const MIN_READ_TIMEOUT: Duration = Duration::from_millis(1);

/// 손실 시뮬레이션이 붙은 UDP 소켓
pub struct UnreliableTransport {
    socket: UdpSocket,
    faults: Box<dyn FaultModel>,
    read_timeout: Option<Duration>,
}

impl UnreliableTransport {
    /// 소켓 바인드
    pub fn bind(addr: impl ToSocketAddrs, faults: Box<dyn FaultModel>) -> Result<Self> {
        let socket = UdpSocket::bind(addr)?;
        Ok(Self {
            socket,
            faults,
            read_timeout: None,
        })
    }

    pub fn local_addr(&self) -> Result<SocketAddr> {
        Ok(self.socket.local_addr()?)
    }

    /// 프레임 전송
    ///
    /// 반환된 [`Fate`]는 통계용이다. 버려진 프레임은 상대의 무응답으로만 드러난다.
    pub fn send(&mut self, packet: &Packet, addr: SocketAddr) -> Result<Fate> {
        let fate = self.faults.next_fate();
        let bytes = packet.encode();

        match fate {
            Fate::Drop => {
                debug!("패킷 손실 (시뮬레이션): {} -> {}", packet, addr);
            }
            Fate::Deliver => {
                self.socket.send_to(&bytes, addr)?;
                trace!("전송: {} -> {}", packet, addr);
            }
            Fate::Duplicate => {
                self.socket.send_to(&bytes, addr)?;
                self.socket.send_to(&bytes, addr)?;
                debug!("패킷 중복 전송 (시뮬레이션): {} -> {}", packet, addr);
            }
        }

        Ok(fate)
    }

    /// 최대 `timeout` 동안 프레임 하나를 기다림
    ///
    /// 타임아웃이면 `Ok(None)`, 디코딩 실패는 [`Error::MalformedFrame`].
    pub fn receive(&mut self, timeout: Duration) -> Result<Option<(Packet, SocketAddr)>> {
        self.set_read_timeout(timeout)?;

        // 최대 프레임보다 1바이트 크게 받아야 초과 크기를 감지할 수 있음
        let mut buf = [0u8; MAX_FRAME_SIZE + 1];
        let (len, addr) = match self.socket.recv_from(&mut buf) {
            Ok(received) => received,
            Err(e) if is_timeout(&e) => return Ok(None),
            Err(e) if is_unreachable(&e) => {
                // ICMP port unreachable -> 손실과 동일하게 취급
                debug!("수신 에러 무시: {}", e);
                return Ok(None);
            }
            Err(e) => return Err(Error::Io(e)),
        };

        let packet = Packet::decode(&buf[..len])?;
        trace!("수신: {} <- {}", packet, addr);
        Ok(Some((packet, addr)))
    }

    fn set_read_timeout(&mut self, timeout: Duration) -> Result<()> {
        let timeout = timeout.max(MIN_READ_TIMEOUT);
        if self.read_timeout != Some(timeout) {
            self.socket.set_read_timeout(Some(timeout))?;
            self.read_timeout = Some(timeout);
        }
        Ok(())
    }
}

fn is_timeout(e: &io::Error) -> bool {
    matches!(e.kind(), io::ErrorKind::WouldBlock | io::ErrorKind::TimedOut)
}

fn is_unreachable(e: &io::Error) -> bool {
    matches!(
        e.kind(),
        io::ErrorKind::ConnectionReset | io::ErrorKind::ConnectionRefused
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fault::{FaultPattern, Reliable};
    use crate::packet::{Identifier, Tag};

    fn loopback(faults: Box<dyn FaultModel>) -> UnreliableTransport {
        UnreliableTransport::bind("127.0.0.1:0", faults).unwrap()
    }

    #[test]
    fn test_send_receive() {
        let mut a = loopback(Box::new(Reliable));
        let mut b = loopback(Box::new(Reliable));
        let packet = Packet::new(Identifier::Zero, Tag::Data, &b"ping"[..]).unwrap();

        assert_eq!(a.send(&packet, b.local_addr().unwrap()).unwrap(), Fate::Deliver);

        let (received, from) = b.receive(Duration::from_secs(1)).unwrap().unwrap();
        assert_eq!(received, packet);
        assert_eq!(from, a.local_addr().unwrap());
    }

    #[test]
    fn test_receive_timeout() {
        let mut a = loopback(Box::new(Reliable));
        assert!(a.receive(Duration::from_millis(20)).unwrap().is_none());
    }

    #[test]
    fn test_dropped_packet_never_arrives() {
        let mut a = loopback(Box::new(FaultPattern::drop_every(1)));
        let mut b = loopback(Box::new(Reliable));

        let fate = a
            .send(&Packet::ack(Identifier::One), b.local_addr().unwrap())
            .unwrap();
        assert_eq!(fate, Fate::Drop);
        assert!(b.receive(Duration::from_millis(50)).unwrap().is_none());
    }

    #[test]
    fn test_duplicated_packet_arrives_twice() {
        let mut a = loopback(Box::new(FaultPattern::duplicate_every(1)));
        let mut b = loopback(Box::new(Reliable));

        a.send(&Packet::ack(Identifier::One), b.local_addr().unwrap())
            .unwrap();
        assert!(b.receive(Duration::from_secs(1)).unwrap().is_some());
        assert!(b.receive(Duration::from_secs(1)).unwrap().is_some());
        assert!(b.receive(Duration::from_millis(20)).unwrap().is_none());
    }

    #[test]
    fn test_malformed_datagram() {
        let raw = UdpSocket::bind("127.0.0.1:0").unwrap();
        let mut b = loopback(Box::new(Reliable));

        raw.send_to(&[1, 2, 3], b.local_addr().unwrap()).unwrap();
        assert!(matches!(
            b.receive(Duration::from_secs(1)),
            Err(Error::MalformedFrame { len: 3 })
        ));

        raw.send_to(&[0u8; 100], b.local_addr().unwrap()).unwrap();
        assert!(matches!(
            b.receive(Duration::from_secs(1)),
            Err(Error::MalformedFrame { .. })
        ));
    }
}

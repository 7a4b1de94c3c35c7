//! 파일 전송 세션
//!
//! 파일 하나를 SOF(파일 이름) → DATA… → EOF 순서의 프레임으로 보낸다.
//! 프레임마다 ACK를 받은 뒤에 다음 청크를 읽는다.

use std::fs::{self, File};
use std::io::{self, BufReader, BufWriter, Read, Write};
use std::net::SocketAddr;
use std::path::{Path, PathBuf};

use bytes::Bytes;
use tracing::{debug, info, warn};

use crate::packet::Tag;
use crate::protocol::AlternatingBit;
use crate::{Error, Result, MAX_DATA_SIZE};

/// 전송 결과 요약
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TransferSummary {
    /// SOF에 실린 파일 이름
    pub file_name: String,

    /// 페이로드 바이트 수
    pub bytes: u64,

    /// DATA 프레임 수
    pub data_frames: u64,
}

/// 파일 길이와 CRC-32
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FileDigest {
    pub len: u64,
    pub crc32: u32,
}

/// 파일 다이제스트 계산 (왕복 검증용)
pub fn file_digest(path: &Path) -> Result<FileDigest> {
    let mut reader = BufReader::new(File::open(path)?);
    let mut hasher = crc32fast::Hasher::new();
    let mut buf = [0u8; 8192];
    let mut len = 0u64;

    loop {
        let n = match reader.read(&mut buf) {
            Ok(0) => break,
            Ok(n) => n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(e.into()),
        };
        hasher.update(&buf[..n]);
        len += n as u64;
    }

    Ok(FileDigest {
        len,
        crc32: hasher.finalize(),
    })
}

/// 수신 중인 파일의 임시 경로 (`<name>.part`)
fn partial_path(path: &Path) -> Result<PathBuf> {
    let name = path
        .file_name()
        .ok_or_else(|| Error::InvalidFilename(path.display().to_string()))?;
    let mut partial = name.to_os_string();
    partial.push(".part");
    Ok(path.with_file_name(partial))
}

/// 버퍼를 가득 채우거나 파일 끝까지 읽음
fn read_chunk(reader: &mut impl Read, buf: &mut [u8]) -> io::Result<usize> {
    let mut filled = 0;
    while filled < buf.len() {
        match reader.read(&mut buf[filled..]) {
            Ok(0) => break,
            Ok(n) => filled += n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(e),
        }
    }
    Ok(filled)
}

/// 파일 하나의 전송 세션
pub struct FileTransfer<'a> {
    engine: &'a mut AlternatingBit,
}

impl<'a> FileTransfer<'a> {
    pub fn new(engine: &'a mut AlternatingBit) -> Self {
        Self { engine }
    }

    /// 파일 전송 (SOF → DATA… → EOF)
    pub fn send_file(&mut self, path: &Path, addr: SocketAddr) -> Result<TransferSummary> {
        let file_name = path
            .file_name()
            .and_then(|name| name.to_str())
            .ok_or_else(|| Error::InvalidFilename(path.display().to_string()))?;
        let attempts = self.engine.max_attempts();

        let sof = self
            .engine
            .packet(Tag::Sof, Bytes::copy_from_slice(file_name.as_bytes()))?;
        let mut reader = BufReader::new(File::open(path)?);

        info!("파일 전송 시작: {} -> {}", file_name, addr);
        self.engine.safe_send(&sof, addr, attempts)?;

        let mut summary = TransferSummary {
            file_name: file_name.to_string(),
            ..TransferSummary::default()
        };
        let mut buf = [0u8; MAX_DATA_SIZE];

        loop {
            let n = read_chunk(&mut reader, &mut buf)?;
            if n == 0 {
                break;
            }

            let packet = self
                .engine
                .packet(Tag::Data, Bytes::copy_from_slice(&buf[..n]))?;
            self.engine.safe_send(&packet, addr, attempts)?;

            summary.bytes += n as u64;
            summary.data_frames += 1;
        }

        let eof = self.engine.packet(Tag::Eof, Bytes::new())?;
        self.engine.safe_send(&eof, addr, attempts)?;

        info!(
            "파일 전송 완료: {} ({} bytes, {} frames)",
            summary.file_name, summary.bytes, summary.data_frames
        );
        Ok(summary)
    }

    /// EOF까지 수신해서 `path`에 저장
    ///
    /// `sof_already_seen`이면 SOF는 이미 처리된 것으로 본다 (서버의 첫 접촉).
    /// 수신은 같은 디렉터리의 `.part` 파일에 쓰고 EOF 이후에만 `path`로
    /// 옮긴다. 실패하면 `.part` 파일만 지우고 기존 `path`는 그대로 둔다.
    pub fn receive_file(
        &mut self,
        path: &Path,
        expected_addr: SocketAddr,
        sof_already_seen: bool,
    ) -> Result<TransferSummary> {
        self.engine.bind_peer(expected_addr)?;

        let partial = partial_path(path)?;
        let mut writer = BufWriter::new(File::create(&partial)?);
        let result = self
            .receive_into(&mut writer, sof_already_seen)
            .and_then(|summary| {
                writer.flush()?;
                Ok(summary)
            });
        drop(writer);

        let result = result.and_then(|summary| {
            fs::rename(&partial, path)?;
            Ok(summary)
        });

        match result {
            Ok(mut summary) => {
                if summary.file_name.is_empty() {
                    summary.file_name = path
                        .file_name()
                        .map(|name| name.to_string_lossy().into_owned())
                        .unwrap_or_default();
                }
                info!(
                    "파일 수신 완료: {} ({} bytes, {} frames)",
                    path.display(),
                    summary.bytes,
                    summary.data_frames
                );
                Ok(summary)
            }
            Err(e) => {
                if let Err(remove_err) = fs::remove_file(&partial) {
                    warn!("불완전한 파일 삭제 실패: {}: {}", partial.display(), remove_err);
                }
                Err(e)
            }
        }
    }

    fn receive_into(&mut self, out: &mut impl Write, mut sof_seen: bool) -> Result<TransferSummary> {
        let attempts = self.engine.max_attempts();
        let mut summary = TransferSummary::default();

        loop {
            let (packet, from) = self.engine.safe_receive(attempts)?;

            match packet.tag() {
                Tag::Sof => {
                    if sof_seen {
                        return self.reject(from, "SOF를 이미 받음");
                    }
                    sof_seen = true;
                    summary.file_name = String::from_utf8_lossy(packet.payload()).into_owned();
                    debug!("SOF 수신: {:?}", summary.file_name);
                }
                Tag::Data => {
                    if !sof_seen {
                        return self.reject(from, "SOF 이전에 DATA 수신");
                    }
                    out.write_all(packet.payload())?;
                    summary.bytes += packet.payload().len() as u64;
                    summary.data_frames += 1;
                }
                Tag::Eof => {
                    if !sof_seen {
                        return self.reject(from, "SOF 이전에 EOF 수신");
                    }
                    if !packet.payload().is_empty() {
                        debug!("EOF 페이로드 무시: {} bytes", packet.payload().len());
                    }
                    return Ok(summary);
                }
                Tag::Error => {
                    return Err(Error::ProtocolViolation("상대가 ERROR 전송".into()));
                }
                Tag::Ack | Tag::Unknown(_) => {
                    return self.reject(from, &format!("파일 수신 중 {} 수신", packet.tag()));
                }
            }
        }
    }

    fn reject<T>(&mut self, addr: SocketAddr, reason: &str) -> Result<T> {
        warn!("세션 중단: {}", reason);
        self.engine.send_error(addr)?;
        Err(Error::ProtocolViolation(reason.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    use crate::fault::Reliable;
    use crate::packet::{Identifier, Packet};
    use crate::transport::UnreliableTransport;
    use crate::Config;

    fn setup() -> (AlternatingBit, UnreliableTransport, SocketAddr, SocketAddr) {
        let config = Config {
            max_attempts: 3,
            timeout: Duration::from_millis(30),
            ..Config::reliable()
        };
        let engine = AlternatingBit::bind("127.0.0.1:0", &config).unwrap();
        let peer = UnreliableTransport::bind("127.0.0.1:0", Box::new(Reliable)).unwrap();
        let engine_addr = engine.local_addr().unwrap();
        let peer_addr = peer.local_addr().unwrap();
        (engine, peer, engine_addr, peer_addr)
    }

    fn frame(identifier: Identifier, tag: Tag, payload: &'static [u8]) -> Packet {
        Packet::new(identifier, tag, payload).unwrap()
    }

    fn recv(peer: &mut UnreliableTransport) -> Packet {
        peer.receive(Duration::from_secs(1))
            .unwrap()
            .expect("frame expected")
            .0
    }

    #[test]
    fn test_read_chunk_fills_buffer() {
        let data: Vec<u8> = (0..100).collect();
        let mut reader = io::Cursor::new(data);
        let mut buf = [0u8; MAX_DATA_SIZE];

        assert_eq!(read_chunk(&mut reader, &mut buf).unwrap(), 58);
        assert_eq!(read_chunk(&mut reader, &mut buf).unwrap(), 42);
        assert_eq!(read_chunk(&mut reader, &mut buf).unwrap(), 0);
    }

    #[test]
    fn test_file_digest() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("d.bin");
        fs::write(&path, b"hello").unwrap();

        let digest = file_digest(&path).unwrap();
        assert_eq!(digest.len, 5);
        assert_eq!(digest.crc32, crc32fast::hash(b"hello"));
    }

    #[test]
    fn test_send_file_chunk_boundaries() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("f.bin");
        let content: Vec<u8> = (0..68).collect();
        fs::write(&path, &content).unwrap();

        let (mut engine, mut peer, engine_addr, peer_addr) = setup();
        for id in [Identifier::Zero, Identifier::One, Identifier::Zero, Identifier::One] {
            peer.send(&Packet::ack(id), engine_addr).unwrap();
        }

        let summary = FileTransfer::new(&mut engine)
            .send_file(&path, peer_addr)
            .unwrap();

        assert_eq!(summary.bytes, 68);
        assert_eq!(summary.data_frames, 2);

        let sof = recv(&mut peer);
        assert_eq!(sof.tag(), Tag::Sof);
        assert_eq!(sof.payload().as_ref(), b"f.bin");

        let first = recv(&mut peer);
        assert_eq!((first.tag(), first.payload().len()), (Tag::Data, 58));
        let second = recv(&mut peer);
        assert_eq!((second.tag(), second.payload().len()), (Tag::Data, 10));
        assert_eq!([first.payload().as_ref(), second.payload().as_ref()].concat(), content);

        let eof = recv(&mut peer);
        assert_eq!(eof.tag(), Tag::Eof);
        assert!(eof.payload().is_empty());
    }

    #[test]
    fn test_send_file_name_too_long() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("n".repeat(MAX_DATA_SIZE + 1));
        fs::write(&path, b"x").unwrap();

        let (mut engine, mut peer, _, peer_addr) = setup();
        let result = FileTransfer::new(&mut engine).send_file(&path, peer_addr);

        assert!(matches!(result, Err(Error::PayloadTooLarge { .. })));
        assert!(peer.receive(Duration::from_millis(50)).unwrap().is_none());
    }

    #[test]
    fn test_receive_file_ignores_duplicate_data() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out.bin");
        let (mut engine, mut peer, engine_addr, peer_addr) = setup();

        for packet in [
            frame(Identifier::Zero, Tag::Sof, b"out.bin"),
            frame(Identifier::One, Tag::Data, b"ab"),
            frame(Identifier::One, Tag::Data, b"ab"),
            frame(Identifier::Zero, Tag::Data, b"cd"),
            frame(Identifier::One, Tag::Eof, b""),
        ] {
            peer.send(&packet, engine_addr).unwrap();
        }

        let summary = FileTransfer::new(&mut engine)
            .receive_file(&path, peer_addr, false)
            .unwrap();

        assert_eq!(fs::read(&path).unwrap(), b"abcd");
        assert_eq!(summary.file_name, "out.bin");
        assert_eq!(summary.data_frames, 2);

        let acks: Vec<Identifier> = (0..5).map(|_| recv(&mut peer).identifier()).collect();
        assert_eq!(
            acks,
            vec![
                Identifier::Zero,
                Identifier::One,
                Identifier::One,
                Identifier::Zero,
                Identifier::One
            ]
        );
        assert_eq!(engine.stats().duplicates_acked, 1);
    }

    #[test]
    fn test_data_before_sof_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out.bin");
        let (mut engine, mut peer, engine_addr, peer_addr) = setup();
        peer.send(&frame(Identifier::Zero, Tag::Data, b"ab"), engine_addr)
            .unwrap();

        let result = FileTransfer::new(&mut engine).receive_file(&path, peer_addr, false);

        assert!(matches!(result, Err(Error::ProtocolViolation(_))));
        assert_eq!(recv(&mut peer).tag(), Tag::Ack);
        assert_eq!(recv(&mut peer).tag(), Tag::Error);
        assert!(!path.exists());
    }

    #[test]
    fn test_second_sof_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out.bin");
        let (mut engine, mut peer, engine_addr, peer_addr) = setup();
        peer.send(&frame(Identifier::Zero, Tag::Sof, b"again"), engine_addr)
            .unwrap();

        let result = FileTransfer::new(&mut engine).receive_file(&path, peer_addr, true);

        assert!(matches!(result, Err(Error::ProtocolViolation(_))));
        assert_eq!(recv(&mut peer).tag(), Tag::Ack);
        assert_eq!(recv(&mut peer).tag(), Tag::Error);
    }

    #[test]
    fn test_peer_error_aborts_and_removes_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out.bin");
        let (mut engine, mut peer, engine_addr, peer_addr) = setup();
        peer.send(&frame(Identifier::Zero, Tag::Sof, b"out.bin"), engine_addr)
            .unwrap();
        peer.send(&frame(Identifier::One, Tag::Data, b"ab"), engine_addr)
            .unwrap();
        peer.send(&Packet::error(Identifier::Zero), engine_addr).unwrap();

        let result = FileTransfer::new(&mut engine).receive_file(&path, peer_addr, false);

        assert!(matches!(result, Err(Error::ProtocolViolation(_))));
        assert!(!path.exists());
    }

    #[test]
    fn test_failed_receive_keeps_existing_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out.bin");
        fs::write(&path, b"original").unwrap();

        let (mut engine, mut peer, engine_addr, peer_addr) = setup();
        peer.send(&frame(Identifier::Zero, Tag::Sof, b"out.bin"), engine_addr)
            .unwrap();
        peer.send(&frame(Identifier::One, Tag::Data, b"ab"), engine_addr)
            .unwrap();

        let result = FileTransfer::new(&mut engine).receive_file(&path, peer_addr, false);

        assert!(matches!(result, Err(Error::ReceiveTimeout { .. })));
        assert_eq!(fs::read(&path).unwrap(), b"original");
        assert!(!dir.path().join("out.bin.part").exists());
    }

    #[test]
    fn test_completed_receive_replaces_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out.bin");
        fs::write(&path, b"stale contents").unwrap();

        let (mut engine, mut peer, engine_addr, peer_addr) = setup();
        for packet in [
            frame(Identifier::Zero, Tag::Sof, b"out.bin"),
            frame(Identifier::One, Tag::Data, b"new"),
            frame(Identifier::Zero, Tag::Eof, b""),
        ] {
            peer.send(&packet, engine_addr).unwrap();
        }

        FileTransfer::new(&mut engine)
            .receive_file(&path, peer_addr, false)
            .unwrap();

        assert_eq!(fs::read(&path).unwrap(), b"new");
        assert!(!dir.path().join("out.bin.part").exists());
    }

    #[test]
    fn test_partial_path() {
        assert_eq!(
            partial_path(Path::new("/tmp/dir/a.txt")).unwrap(),
            PathBuf::from("/tmp/dir/a.txt.part")
        );
        assert!(partial_path(Path::new("/")).is_err());
    }

    #[test]
    fn test_receive_from_other_address_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out.bin");
        let (mut engine, mut peer, engine_addr, _) = setup();
        let expected: SocketAddr = "127.0.0.1:9".parse().unwrap();
        peer.send(&frame(Identifier::Zero, Tag::Sof, b"out.bin"), engine_addr)
            .unwrap();

        let result = FileTransfer::new(&mut engine).receive_file(&path, expected, false);

        assert!(matches!(result, Err(Error::MultiplePeers { bound, .. }) if bound == expected));
    }
}

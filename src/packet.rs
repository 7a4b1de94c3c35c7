//! 프레임 정의와 인코딩/디코딩
//!
//! 와이어 포맷 (빅엔디언):
//!
//! ```text
//! byte 0    : identifier (0 | 1)
//! byte 1    : tag (1=ACK, 2=SOF, 3=EOF, 4=DATA, 5=ERROR)
//! bytes 2-5 : checksum (CRC-32, 페이로드 기준)
//! bytes 6.. : payload (0..=58 bytes)
//! ```
//!
//! 디코딩은 크기와 identifier만 검사한다. 체크섬과 태그의 유효성은
//! ARQ 엔진이 판단해서 ERROR 프레임으로 응답할 수 있어야 한다.

use std::fmt;

use bytes::{BufMut, Bytes, BytesMut};

use crate::{Error, Result, HEADER_SIZE, MAX_DATA_SIZE, MAX_FRAME_SIZE};

/// 교대 비트 시퀀스 번호
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Identifier {
    #[default]
    Zero,
    One,
}

impl Identifier {
    pub fn from_u8(value: u8) -> Option<Self> {
        match value {
            0 => Some(Identifier::Zero),
            1 => Some(Identifier::One),
            _ => None,
        }
    }

    pub fn as_u8(self) -> u8 {
        match self {
            Identifier::Zero => 0,
            Identifier::One => 1,
        }
    }

    /// 반대 비트
    pub fn flipped(self) -> Self {
        match self {
            Identifier::Zero => Identifier::One,
            Identifier::One => Identifier::Zero,
        }
    }
}

impl fmt::Display for Identifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_u8())
    }
}

/// 프레임 태그
///
/// 수신한 프레임의 태그 바이트가 알 수 없는 값이면 `Unknown`으로 보존된다.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Tag {
    Ack,
    /// 파일 시작 (페이로드 = 파일 이름)
    Sof,
    /// 파일 끝
    Eof,
    Data,
    Error,
    Unknown(u8),
}

impl Tag {
    pub fn as_u8(self) -> u8 {
        match self {
            Tag::Ack => 1,
            Tag::Sof => 2,
            Tag::Eof => 3,
            Tag::Data => 4,
            Tag::Error => 5,
            Tag::Unknown(value) => value,
        }
    }

    pub fn is_known(self) -> bool {
        !matches!(self, Tag::Unknown(_))
    }
}

impl From<u8> for Tag {
    fn from(value: u8) -> Self {
        match value {
            1 => Tag::Ack,
            2 => Tag::Sof,
            3 => Tag::Eof,
            4 => Tag::Data,
            5 => Tag::Error,
            other => Tag::Unknown(other),
        }
    }
}

impl fmt::Display for Tag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Tag::Ack => f.write_str("ACK"),
            Tag::Sof => f.write_str("SOF"),
            Tag::Eof => f.write_str("EOF"),
            Tag::Data => f.write_str("DATA"),
            Tag::Error => f.write_str("ERROR"),
            Tag::Unknown(value) => write!(f, "UNKNOWN({value})"),
        }
    }
}

/// 페이로드 체크섬
pub fn checksum(payload: &[u8]) -> u32 {
    crc32fast::hash(payload)
}

/// 프로토콜 프레임 하나
///
/// 생성 후 변경 불가. 직접 만든 패킷은 항상 페이로드의 체크섬을 들고 있고,
/// 디코딩한 패킷은 헤더에 선언된 체크섬을 그대로 보존한다.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Packet {
    identifier: Identifier,
    tag: Tag,
    checksum: u32,
    payload: Bytes,
}

impl Packet {
    /// 새 패킷 생성
    pub fn new(identifier: Identifier, tag: Tag, payload: impl Into<Bytes>) -> Result<Self> {
        let payload = payload.into();
        if payload.len() > MAX_DATA_SIZE {
            return Err(Error::PayloadTooLarge {
                len: payload.len(),
                max: MAX_DATA_SIZE,
            });
        }
        if let Tag::Unknown(value) = tag {
            return Err(Error::UnsupportedTag(value));
        }

        Ok(Self {
            identifier,
            tag,
            checksum: checksum(&payload),
            payload,
        })
    }

    /// 빈 ACK 프레임
    pub fn ack(identifier: Identifier) -> Self {
        Self::control(identifier, Tag::Ack)
    }

    /// 빈 ERROR 프레임
    pub fn error(identifier: Identifier) -> Self {
        Self::control(identifier, Tag::Error)
    }

    fn control(identifier: Identifier, tag: Tag) -> Self {
        Self {
            identifier,
            tag,
            checksum: checksum(&[]),
            payload: Bytes::new(),
        }
    }

    pub fn identifier(&self) -> Identifier {
        self.identifier
    }

    pub fn tag(&self) -> Tag {
        self.tag
    }

    pub fn checksum(&self) -> u32 {
        self.checksum
    }

    pub fn payload(&self) -> &Bytes {
        &self.payload
    }

    /// 선언된 체크섬이 페이로드와 일치하는지
    pub fn verify(&self) -> bool {
        checksum(&self.payload) == self.checksum
    }

    /// 바이트로 직렬화
    pub fn encode(&self) -> Bytes {
        let mut buf = BytesMut::with_capacity(HEADER_SIZE + self.payload.len());
        buf.put_u8(self.identifier.as_u8());
        buf.put_u8(self.tag.as_u8());
        buf.put_u32(self.checksum);
        buf.put_slice(&self.payload);
        debug_assert!(buf.len() <= MAX_FRAME_SIZE);
        buf.freeze()
    }

    /// 바이트에서 역직렬화
    pub fn decode(bytes: &[u8]) -> Result<Self> {
        if bytes.len() < HEADER_SIZE || bytes.len() > MAX_FRAME_SIZE {
            return Err(Error::MalformedFrame { len: bytes.len() });
        }

        let identifier =
            Identifier::from_u8(bytes[0]).ok_or(Error::MalformedFrame { len: bytes.len() })?;
        let tag = Tag::from(bytes[1]);
        let checksum = u32::from_be_bytes([bytes[2], bytes[3], bytes[4], bytes[5]]);

        Ok(Self {
            identifier,
            tag,
            checksum,
            payload: Bytes::copy_from_slice(&bytes[HEADER_SIZE..]),
        })
    }
}

impl fmt::Display for Packet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}#{} ({} bytes, crc={:08X})",
            self.tag,
            self.identifier,
            self.payload.len(),
            self.checksum
        )
    }
}

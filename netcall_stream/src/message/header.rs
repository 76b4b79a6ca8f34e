use byteorder::{BigEndian, ByteOrder, LittleEndian};
use netcall_types::prelude::*;
use serde::{Deserialize, Serialize};

pub const GIOP_MAGIC: [u8; 4] = *b"GIOP";
pub const HEADER_SIZE: usize = 12;
/// Flags bit 0: the length field (and body) are little-endian
pub const FLAG_LITTLE_ENDIAN: u8 = 0x01;

#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum MessageType {
    Request,
    Reply,
    CancelRequest,
    LocateRequest,
    LocateReply,
    CloseConnection,
    MessageError,
    Fragment,
    Other(u8),
}

impl From<u8> for MessageType {
    fn from(code: u8) -> Self {
        match code {
            0 => MessageType::Request,
            1 => MessageType::Reply,
            2 => MessageType::CancelRequest,
            3 => MessageType::LocateRequest,
            4 => MessageType::LocateReply,
            5 => MessageType::CloseConnection,
            6 => MessageType::MessageError,
            7 => MessageType::Fragment,
            other => MessageType::Other(other),
        }
    }
}

impl From<MessageType> for u8 {
    fn from(message_type: MessageType) -> Self {
        match message_type {
            MessageType::Request => 0,
            MessageType::Reply => 1,
            MessageType::CancelRequest => 2,
            MessageType::LocateRequest => 3,
            MessageType::LocateReply => 4,
            MessageType::CloseConnection => 5,
            MessageType::MessageError => 6,
            MessageType::Fragment => 7,
            MessageType::Other(code) => code,
        }
    }
}

/// The fixed 12-byte header in front of every message
#[derive(Copy, Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct MessageHeader {
    pub major: u8,
    pub minor: u8,
    pub flags: u8,
    pub message_type: MessageType,
    /// Body length in bytes
    pub size: u32,
}

impl MessageHeader {
    pub fn new(major: u8, minor: u8, message_type: MessageType) -> Self {
        Self {
            major,
            minor,
            flags: 0,
            message_type,
            size: 0,
        }
    }

    pub fn is_little_endian(&self) -> bool {
        self.flags & FLAG_LITTLE_ENDIAN != 0
    }

    /// Returns a copy whose byte-order bit matches this host
    pub fn with_host_order(mut self) -> Self {
        if cfg!(target_endian = "little") {
            self.flags |= FLAG_LITTLE_ENDIAN;
        } else {
            self.flags &= !FLAG_LITTLE_ENDIAN;
        }
        self
    }

    pub fn encode(&self) -> [u8; HEADER_SIZE] {
        let mut raw = [0u8; HEADER_SIZE];
        raw[..4].copy_from_slice(&GIOP_MAGIC);
        raw[4] = self.major;
        raw[5] = self.minor;
        raw[6] = self.flags;
        raw[7] = self.message_type.into();
        if self.is_little_endian() {
            LittleEndian::write_u32(&mut raw[8..], self.size);
        } else {
            BigEndian::write_u32(&mut raw[8..], self.size);
        }

        raw
    }

    pub fn decode(raw: &[u8; HEADER_SIZE]) -> NetResult<Self> {
        if raw[..4] != GIOP_MAGIC {
            let mut magic = [0u8; 4];
            magic.copy_from_slice(&raw[..4]);
            return Err(NetError::BadMagic(magic));
        }

        let flags = raw[6];
        let size = if flags & FLAG_LITTLE_ENDIAN != 0 {
            LittleEndian::read_u32(&raw[8..])
        } else {
            BigEndian::read_u32(&raw[8..])
        };

        Ok(Self {
            major: raw[4],
            minor: raw[5],
            flags,
            message_type: raw[7].into(),
            size,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case([b'G', b'I', b'O', b'P', 1, 2, 0x01, 1, 0x10, 0, 0, 0], true)]
    #[case([b'G', b'I', b'O', b'P', 1, 2, 0x00, 1, 0, 0, 0, 0x10], false)]
    fn length_follows_the_flags_bit(#[case] raw: [u8; HEADER_SIZE], #[case] little: bool) {
        let header = MessageHeader::decode(&raw).unwrap();
        assert_eq!(header.is_little_endian(), little);
        assert_eq!((header.major, header.minor), (1, 2));
        assert_eq!(header.message_type, MessageType::Reply);
        assert_eq!(header.size, 16);
        assert_eq!(header.encode(), raw);
    }

    #[test]
    fn bad_magic_is_rejected() {
        let raw = *b"HTTP/1.1 200";
        assert!(matches!(
            MessageHeader::decode(&raw),
            Err(NetError::BadMagic(magic)) if &magic == b"HTTP"
        ));
    }

    #[test]
    fn unknown_types_are_preserved() {
        let mut header = MessageHeader::new(1, 0, MessageType::Other(42));
        header.size = 3;
        let decoded = MessageHeader::decode(&header.encode()).unwrap();
        assert_eq!(decoded.message_type, MessageType::Other(42));
        assert_eq!(u8::from(MessageType::from(5)), 5);
        assert_eq!(MessageType::from(7), MessageType::Fragment);
    }

    #[test]
    fn host_order_sets_the_flags_bit() {
        let header = MessageHeader::new(1, 2, MessageType::Request).with_host_order();
        assert_eq!(header.is_little_endian(), cfg!(target_endian = "little"));
        let cleared = MessageHeader {
            flags: 0xFF,
            ..header
        }
        .with_host_order();
        assert_eq!(cleared.flags & 0xFE, 0xFE);
    }
}

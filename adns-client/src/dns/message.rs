use crate::core::ResolveError;
use crate::dns::core::{RecordClass, RecordType};
use crate::dns::name::Name;
use crate::dns::rdata::{RecordData, RecordDataOpt};
use byteorder::{NetworkEndian, ReadBytesExt, WriteBytesExt};
use std::fmt;
use std::fmt::{Debug, Formatter};
use std::io::{Cursor, Seek};

#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash, Ord, PartialOrd)]
#[repr(transparent)]
pub struct MessageId(u16);

impl MessageId {
    pub fn random() -> Self {
        Self(rand::random())
    }

    pub fn size(&self) -> usize {
        2
    }
}

impl From<u16> for MessageId {
    fn from(value: u16) -> Self {
        Self(value)
    }
}

impl From<MessageId> for u16 {
    fn from(value: MessageId) -> Self {
        value.0
    }
}

impl fmt::Display for MessageId {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A complete DNS message: header, questions, and the three record sections.
///
/// Messages are built with the `add_*` methods and converted to and from bytes
/// with `encode` and `decode` (or the lower level `write_network_bytes` and
/// `read_network_bytes` when a particular reader or writer is needed).
#[derive(Debug, Clone, Eq, PartialEq)]
pub struct Message {
    id: MessageId,
    flags: Flags,
    questions: Vec<Question>,
    answers: Vec<Record>,
    authority: Vec<Record>,
    extra: Vec<Record>,
}

impl Message {
    /// Largest UDP payload a client may advertise without EDNS.
    pub const MAX_UDP_SIZE: usize = 512;

    pub fn new(id: MessageId, flags: Flags) -> Self {
        Self {
            id,
            flags,
            questions: Vec::new(),
            answers: Vec::new(),
            authority: Vec::new(),
            extra: Vec::new(),
        }
    }

    /// Decode a message from a complete datagram (or TCP frame without the length
    /// prefix). Any problem with the bytes is reported as `ErrorKind::MalformedMessage`.
    pub fn decode(bytes: &[u8]) -> Result<Self, ResolveError> {
        let mut cur = Cursor::new(bytes);
        Self::read_network_bytes(&mut cur).map_err(|e| e.into_malformed())
    }

    pub fn encode(&self) -> Result<Vec<u8>, ResolveError> {
        let mut buf = Vec::with_capacity(self.size());
        self.write_network_bytes(&mut buf)?;
        Ok(buf)
    }

    pub fn size(&self) -> usize {
        self.id.size()
            + self.flags.size()
            + (2 * 4) // lengths of questions, answers, authority, extra
            + self.questions.iter().map(|q| q.size()).sum::<usize>()
            + self.answers.iter().map(|r| r.size()).sum::<usize>()
            + self.authority.iter().map(|r| r.size()).sum::<usize>()
            + self.extra.iter().map(|r| r.size()).sum::<usize>()
    }

    pub fn id(&self) -> MessageId {
        self.id
    }

    pub fn set_id(mut self, id: MessageId) -> Self {
        self.id = id;
        self
    }

    pub fn flags(&self) -> Flags {
        self.flags
    }

    pub fn questions(&self) -> &[Question] {
        &self.questions
    }

    pub fn add_question(mut self, q: Question) -> Self {
        self.questions.push(q);
        self
    }

    pub fn answers(&self) -> &[Record] {
        &self.answers
    }

    pub fn add_answer(mut self, r: Record) -> Self {
        self.answers.push(r);
        self
    }

    pub fn authority(&self) -> &[Record] {
        &self.authority
    }

    pub fn add_authority(mut self, r: Record) -> Self {
        self.authority.push(r);
        self
    }

    pub fn extra(&self) -> &[Record] {
        &self.extra
    }

    pub fn add_extra(mut self, r: Record) -> Self {
        self.extra.push(r);
        self
    }

    /// Advertise support for EDNS with the given UDP payload size by adding an
    /// OPT pseudo-record to the additional section. The payload size is carried
    /// in the class field of the record.
    pub fn set_edns(self, payload: u16) -> Self {
        let opt = Record::new(
            Name::root(),
            RecordType::OPT,
            RecordClass::from(payload),
            0,
            RecordData::OPT(RecordDataOpt::default()),
        );
        self.add_extra(opt)
    }

    /// UDP payload size advertised by an OPT record in this message, if any.
    pub fn edns_payload(&self) -> Option<u16> {
        self.extra
            .iter()
            .find(|r| r.rtype() == RecordType::OPT)
            .map(|r| u16::from(r.rclass()))
    }

    fn header(&self) -> Result<Header, ResolveError> {
        let count = |n: usize, section: &str| {
            u16::try_from(n).map_err(|_| ResolveError::internal(format!("too many {} in message: {}", section, n)))
        };

        Ok(Header {
            id: self.id,
            flags: self.flags,
            num_questions: count(self.questions.len(), "questions")?,
            num_answers: count(self.answers.len(), "answers")?,
            num_authority: count(self.authority.len(), "authority records")?,
            num_extra: count(self.extra.len(), "additional records")?,
        })
    }

    pub fn write_network_bytes<T>(&self, mut buf: T) -> Result<(), ResolveError>
    where
        T: WriteBytesExt,
    {
        let header = self.header()?;
        header.write_network_bytes(&mut buf)?;

        for q in self.questions.iter() {
            q.write_network_bytes(&mut buf)?;
        }

        for r in self.answers.iter().chain(self.authority.iter()).chain(self.extra.iter()) {
            r.write_network_bytes(&mut buf)?;
        }

        Ok(())
    }

    pub fn read_network_bytes<T>(mut buf: T) -> Result<Self, ResolveError>
    where
        T: ReadBytesExt + Seek,
    {
        let header = Header::read_network_bytes(&mut buf)?;

        let mut questions = Vec::with_capacity(usize::from(header.num_questions).min(16));
        for _ in 0..header.num_questions {
            questions.push(Question::read_network_bytes(&mut buf)?);
        }

        let mut read_section = |n: u16| -> Result<Vec<Record>, ResolveError> {
            let mut records = Vec::with_capacity(usize::from(n).min(64));
            for _ in 0..n {
                records.push(Record::read_network_bytes(&mut buf)?);
            }
            Ok(records)
        };

        let answers = read_section(header.num_answers)?;
        let authority = read_section(header.num_authority)?;
        let extra = read_section(header.num_extra)?;

        Ok(Self {
            id: header.id,
            flags: header.flags,
            questions,
            answers,
            authority,
            extra,
        })
    }
}

#[derive(Debug, Clone, Eq, PartialEq)]
struct Header {
    id: MessageId,
    flags: Flags,
    num_questions: u16,
    num_answers: u16,
    num_authority: u16,
    num_extra: u16,
}

impl Header {
    fn write_network_bytes<T>(&self, mut buf: T) -> Result<(), ResolveError>
    where
        T: WriteBytesExt,
    {
        buf.write_u16::<NetworkEndian>(self.id.into())?;
        buf.write_u16::<NetworkEndian>(self.flags.as_u16())?;
        buf.write_u16::<NetworkEndian>(self.num_questions)?;
        buf.write_u16::<NetworkEndian>(self.num_answers)?;
        buf.write_u16::<NetworkEndian>(self.num_authority)?;
        Ok(buf.write_u16::<NetworkEndian>(self.num_extra)?)
    }

    fn read_network_bytes<T>(mut buf: T) -> Result<Self, ResolveError>
    where
        T: ReadBytesExt,
    {
        let id = MessageId::from(buf.read_u16::<NetworkEndian>()?);
        let flags = Flags::try_from(buf.read_u16::<NetworkEndian>()?)?;
        let num_questions = buf.read_u16::<NetworkEndian>()?;
        let num_answers = buf.read_u16::<NetworkEndian>()?;
        let num_authority = buf.read_u16::<NetworkEndian>()?;
        let num_extra = buf.read_u16::<NetworkEndian>()?;

        Ok(Header {
            id,
            flags,
            num_questions,
            num_answers,
            num_authority,
            num_extra,
        })
    }
}

#[derive(Default, Copy, Clone, Eq, PartialEq)]
#[repr(transparent)]
pub struct Flags(u16);

impl Flags {
    const MASK_QR: u16 = 0b1000_0000_0000_0000; // query / response
    const MASK_OP: u16 = 0b0111_1000_0000_0000; // 4 bits, op code
    const MASK_AA: u16 = 0b0000_0100_0000_0000; // authoritative answer
    const MASK_TC: u16 = 0b0000_0010_0000_0000; // truncated
    const MASK_RD: u16 = 0b0000_0001_0000_0000; // recursion desired
    const MASK_RA: u16 = 0b0000_0000_1000_0000; // recursion available
    const MASK_RC: u16 = 0b0000_0000_0000_1111; // 4 bits, response code

    const OFFSET_QR: usize = 15;
    const OFFSET_OP: usize = 11;
    const OFFSET_AA: usize = 10;
    const OFFSET_TC: usize = 9;
    const OFFSET_RD: usize = 8;
    const OFFSET_RA: usize = 7;
    const OFFSET_RC: usize = 0;

    pub fn size(&self) -> usize {
        2
    }

    pub fn is_query(&self) -> bool {
        self.0 & Self::MASK_QR == 0
    }

    pub fn set_query(self) -> Self {
        Flags(self.0 & !Self::MASK_QR)
    }

    pub fn is_response(&self) -> bool {
        self.0 & Self::MASK_QR > 0
    }

    pub fn set_response(self) -> Self {
        Flags(self.0 | Self::MASK_QR)
    }

    pub fn get_op_code(&self) -> Operation {
        Operation::try_from((self.0 & Self::MASK_OP) >> Self::OFFSET_OP).unwrap_or_default()
    }

    pub fn set_op_code(self, op: Operation) -> Self {
        let op = (op as u16) << Self::OFFSET_OP;
        Flags((self.0 & !Self::MASK_OP) | op)
    }

    pub fn is_authoritative(&self) -> bool {
        self.0 & Self::MASK_AA > 0
    }

    pub fn set_authoritative(self) -> Self {
        Flags(self.0 | Self::MASK_AA)
    }

    pub fn is_truncated(&self) -> bool {
        self.0 & Self::MASK_TC > 0
    }

    pub fn set_truncated(self) -> Self {
        Flags(self.0 | Self::MASK_TC)
    }

    pub fn is_recursion_desired(&self) -> bool {
        self.0 & Self::MASK_RD > 0
    }

    pub fn set_recursion_desired(self) -> Self {
        Flags(self.0 | Self::MASK_RD)
    }

    pub fn is_recursion_available(&self) -> bool {
        self.0 & Self::MASK_RA > 0
    }

    pub fn set_recursion_available(self) -> Self {
        Flags(self.0 | Self::MASK_RA)
    }

    pub fn get_response_code(&self) -> ResponseCode {
        ResponseCode::try_from((self.0 & Self::MASK_RC) >> Self::OFFSET_RC).unwrap_or_default()
    }

    pub fn set_response_code(self, code: ResponseCode) -> Self {
        let code = ((code as u16) << Self::OFFSET_RC) & Self::MASK_RC;
        Flags((self.0 & !Self::MASK_RC) | code)
    }

    pub fn as_u16(&self) -> u16 {
        self.0
    }
}

impl TryFrom<u16> for Flags {
    type Error = ResolveError;

    fn try_from(value: u16) -> Result<Self, Self::Error> {
        // Operation and response code must be known values. Every other field is
        // a single bit so any combination is accepted even if it doesn't make sense.
        let _op = Operation::try_from((value & Self::MASK_OP) >> Self::OFFSET_OP)?;
        let _rc = ResponseCode::try_from((value & Self::MASK_RC) >> Self::OFFSET_RC)?;
        Ok(Flags(value))
    }
}

impl Debug for Flags {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let qr = (self.0 & Self::MASK_QR) >> Self::OFFSET_QR;
        let op = self.get_op_code();
        let aa = (self.0 & Self::MASK_AA) >> Self::OFFSET_AA;
        let tc = (self.0 & Self::MASK_TC) >> Self::OFFSET_TC;
        let rd = (self.0 & Self::MASK_RD) >> Self::OFFSET_RD;
        let ra = (self.0 & Self::MASK_RA) >> Self::OFFSET_RA;
        let rc = self.get_response_code();

        write!(
            f,
            "Flags{{qr = {qr}, op = {op:?}, aa = {aa}, tc = {tc}, rd = {rd}, ra = {ra}, rc = {rc:?}}}"
        )
    }
}

#[derive(Debug, Default, Copy, Clone, Eq, PartialEq)]
#[repr(u16)]
pub enum ResponseCode {
    #[default]
    NoError = 0,
    FormatError = 1,
    ServerFailure = 2,
    NameError = 3,
    NotImplemented = 4,
    Refused = 5,
    YxDomain = 6,
    YxRrSet = 7,
    NxRrSet = 8,
    NotAuth = 9,
    NotZone = 10,
}

impl TryFrom<u16> for ResponseCode {
    type Error = ResolveError;

    fn try_from(value: u16) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(ResponseCode::NoError),
            1 => Ok(ResponseCode::FormatError),
            2 => Ok(ResponseCode::ServerFailure),
            3 => Ok(ResponseCode::NameError),
            4 => Ok(ResponseCode::NotImplemented),
            5 => Ok(ResponseCode::Refused),
            6 => Ok(ResponseCode::YxDomain),
            7 => Ok(ResponseCode::YxRrSet),
            8 => Ok(ResponseCode::NxRrSet),
            9 => Ok(ResponseCode::NotAuth),
            10 => Ok(ResponseCode::NotZone),
            _ => Err(ResolveError::malformed(format!(
                "invalid or unsupported response code {}",
                value
            ))),
        }
    }
}

#[derive(Debug, Default, Copy, Clone, Eq, PartialEq)]
#[repr(u16)]
pub enum Operation {
    #[default]
    Query = 0,
    IQuery = 1,
    Status = 2,
    Notify = 4,
    Update = 5,
}

impl TryFrom<u16> for Operation {
    type Error = ResolveError;

    fn try_from(value: u16) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(Operation::Query),
            1 => Ok(Operation::IQuery),
            2 => Ok(Operation::Status),
            4 => Ok(Operation::Notify),
            5 => Ok(Operation::Update),
            _ => Err(ResolveError::malformed(format!(
                "invalid or unsupported operation {}",
                value
            ))),
        }
    }
}

#[derive(Debug, Clone, Eq, PartialEq, Hash)]
pub struct Question {
    name: Name,
    qtype: RecordType,
    qclass: RecordClass,
}

impl Question {
    pub fn new(name: Name, qtype: RecordType) -> Self {
        Self {
            name,
            qtype,
            qclass: RecordClass::INET,
        }
    }

    pub fn size(&self) -> usize {
        self.name.size() + self.qtype.size() + self.qclass.size()
    }

    pub fn set_qclass(mut self, qclass: RecordClass) -> Self {
        self.qclass = qclass;
        self
    }

    pub fn name(&self) -> &Name {
        &self.name
    }

    pub fn qtype(&self) -> RecordType {
        self.qtype
    }

    pub fn qclass(&self) -> RecordClass {
        self.qclass
    }

    pub fn write_network_bytes<T>(&self, mut buf: T) -> Result<(), ResolveError>
    where
        T: WriteBytesExt,
    {
        self.name.write_network_bytes(&mut buf)?;
        buf.write_u16::<NetworkEndian>(self.qtype.into())?;
        Ok(buf.write_u16::<NetworkEndian>(self.qclass.into())?)
    }

    pub fn read_network_bytes<T>(mut buf: T) -> Result<Self, ResolveError>
    where
        T: ReadBytesExt + Seek,
    {
        let name = Name::read_network_bytes(&mut buf)?;
        let qtype = RecordType::from(buf.read_u16::<NetworkEndian>()?);
        let qclass = RecordClass::from(buf.read_u16::<NetworkEndian>()?);
        Ok(Self { name, qtype, qclass })
    }
}

#[derive(Debug, Clone, Eq, PartialEq)]
pub struct Record {
    name: Name,
    rtype: RecordType,
    rclass: RecordClass,
    ttl: u32,
    rdata: RecordData,
}

impl Record {
    pub fn new(name: Name, rtype: RecordType, rclass: RecordClass, ttl: u32, rdata: RecordData) -> Self {
        Self {
            name,
            rtype,
            rclass,
            ttl,
            rdata,
        }
    }

    pub fn size(&self) -> usize {
        self.name.size()
            + self.rtype.size()
            + self.rclass.size()
            + 4 // ttl
            + 2 // rdata length
            + self.rdata.size()
    }

    pub fn name(&self) -> &Name {
        &self.name
    }

    pub fn rtype(&self) -> RecordType {
        self.rtype
    }

    pub fn rclass(&self) -> RecordClass {
        self.rclass
    }

    pub fn ttl(&self) -> u32 {
        self.ttl
    }

    pub fn rdata(&self) -> &RecordData {
        &self.rdata
    }

    pub fn write_network_bytes<T>(&self, mut buf: T) -> Result<(), ResolveError>
    where
        T: WriteBytesExt,
    {
        let size = u16::try_from(self.rdata.size()).map_err(|_| {
            ResolveError::internal(format!(
                "rdata length of {} bytes exceeds max of {} bytes",
                self.rdata.size(),
                u16::MAX
            ))
        })?;

        self.name.write_network_bytes(&mut buf)?;
        buf.write_u16::<NetworkEndian>(self.rtype.into())?;
        buf.write_u16::<NetworkEndian>(self.rclass.into())?;
        buf.write_u32::<NetworkEndian>(self.ttl)?;
        buf.write_u16::<NetworkEndian>(size)?;
        self.rdata.write_network_bytes(&mut buf)
    }

    pub fn read_network_bytes<T>(mut buf: T) -> Result<Self, ResolveError>
    where
        T: ReadBytesExt + Seek,
    {
        let name = Name::read_network_bytes(&mut buf)?;
        let rtype = RecordType::from(buf.read_u16::<NetworkEndian>()?);
        let rclass = RecordClass::from(buf.read_u16::<NetworkEndian>()?);
        let ttl = buf.read_u32::<NetworkEndian>()?;
        let rdata_len = buf.read_u16::<NetworkEndian>()?;

        let start = buf.stream_position()?;
        let rdata = RecordData::read_network_bytes(rtype, rdata_len, &mut buf)?;
        let consumed = buf.stream_position()? - start;
        if consumed != u64::from(rdata_len) {
            return Err(ResolveError::malformed(format!(
                "{} record data was {} bytes, header claimed {}",
                rtype, consumed, rdata_len
            )));
        }

        Ok(Self {
            name,
            rtype,
            rclass,
            ttl,
            rdata,
        })
    }
}

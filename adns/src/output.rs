use adns_client::dns::{Message, Question, Record};
use adns_client::{Answer, ResolveError};
use std::fmt::Write;

/// Long form status of a query result.
pub fn status_text(res: &Result<Answer, ResolveError>) -> String {
    match res {
        Ok(_) => "OK".to_owned(),
        Err(e) => e.kind().to_string(),
    }
}

/// Short form status of a query result suitable for machine readable output.
pub fn status_abbrev(res: &Result<Answer, ResolveError>) -> &'static str {
    match res {
        Ok(_) => "ok",
        Err(e) => e.kind().abbrev(),
    }
}

/// Format the records of an answer as dig-like text.
pub fn format_answer(buf: &mut String, answer: &Answer) {
    let _ = writeln!(
        buf,
        ";; {} {} {}{}",
        answer.owner(),
        answer.rclass(),
        answer.rtype(),
        if answer.from_cache() { " (cached)" } else { "" }
    );

    if let Some(c) = answer.cname() {
        let _ = writeln!(buf, ";; canonical name: {}", c);
    }

    format_records(buf, answer.records());
}

/// Format a single line summary of a query result for batch output.
pub fn format_result_line(buf: &mut String, name: &str, res: &Result<Answer, ResolveError>) {
    let _ = write!(buf, "{} status={}", name, status_abbrev(res));
    match res {
        Ok(answer) => {
            for rdata in answer.rdata() {
                let _ = write!(buf, " {}", rdata);
            }
        }
        Err(e) => {
            let _ = write!(buf, " err=\"{}\"", e);
        }
    }

    let _ = writeln!(buf);
}

/// Decode a complete binary message and format it as dig-like text. Trailing
/// bytes after the message are rejected as malformed.
pub fn format_wire(buf: &mut String, bytes: &[u8]) -> Result<(), ResolveError> {
    let msg = Message::decode(bytes)?;
    format_message(buf, &msg);
    Ok(())
}

/// Format a full message as dig-like text.
pub fn format_message(buf: &mut String, msg: &Message) {
    format_header(buf, msg);
    format_question(buf, msg.questions());
    format_section(buf, "ANSWER", msg.answers());
    format_section(buf, "AUTHORITY", msg.authority());
    format_section(buf, "ADDITIONAL", msg.extra());
}

fn format_header(buf: &mut String, msg: &Message) {
    let _ = writeln!(
        buf,
        ";; >>HEADER<< opcode: {:?}, status: {:?}, id: {}",
        msg.flags().get_op_code(),
        msg.flags().get_response_code(),
        msg.id()
    );
    let _ = writeln!(buf, ";; flags: {:?}", msg.flags());
    if let Some(payload) = msg.edns_payload() {
        let _ = writeln!(buf, ";; EDNS: udp: {}", payload);
    }
}

fn format_question(buf: &mut String, questions: &[Question]) {
    let _ = writeln!(buf, ";; QUESTION SECTION:");
    for q in questions {
        let _ = writeln!(buf, "; {}\t\t\t{}\t{}", q.name(), q.qclass(), q.qtype());
    }
}

fn format_section(buf: &mut String, name: &str, records: &[Record]) {
    let _ = writeln!(buf, ";; {} SECTION:", name);
    format_records(buf, records);
}

fn format_records(buf: &mut String, records: &[Record]) {
    for r in records {
        let _ = writeln!(
            buf,
            "{}\t\t{}\t{}\t{}\t{}",
            r.name(),
            r.ttl(),
            r.rclass(),
            r.rtype(),
            r.rdata()
        );
    }
}

#[cfg(test)]
mod test {
    use super::{format_message, format_result_line, format_wire, status_abbrev, status_text};
    use adns_client::dns::{
        Flags, Message, MessageId, Name, Question, Record, RecordClass, RecordData, RecordDataMX, RecordType,
    };
    use adns_client::{Answer, ErrorKind, ResolveError};
    use std::str::FromStr;

    fn err(kind: ErrorKind) -> Result<Answer, ResolveError> {
        Err(ResolveError::from_kind(kind))
    }

    #[test]
    fn test_status_text() {
        assert_eq!("no such domain", status_text(&err(ErrorKind::NXDomain)));
        assert_eq!("query timed out", status_text(&err(ErrorKind::Timeout)));
    }

    #[test]
    fn test_status_abbrev() {
        assert_eq!("nxdomain", status_abbrev(&err(ErrorKind::NXDomain)));
        assert_eq!("canceled", status_abbrev(&err(ErrorKind::Canceled)));
    }

    #[test]
    fn test_format_result_line_error() {
        let mut buf = String::new();
        format_result_line(&mut buf, "missing.example.com", &err(ErrorKind::NXDomain));
        assert_eq!("missing.example.com status=nxdomain err=\"no such domain\"\n", buf);
    }

    #[test]
    fn test_format_message() {
        let name = Name::from_str("example.com.").unwrap();
        let msg = Message::new(MessageId::from(4321), Flags::default().set_response())
            .add_question(Question::new(name.clone(), RecordType::MX))
            .add_answer(Record::new(
                name.clone(),
                RecordType::MX,
                RecordClass::INET,
                300,
                RecordData::MX(RecordDataMX::new(10, Name::from_str("mail.example.com.").unwrap())),
            ));

        let mut buf = String::new();
        format_message(&mut buf, &msg);

        assert!(buf.contains("id: 4321"));
        assert!(buf.contains(";; QUESTION SECTION:\n; example.com.\t\t\tIN\tMX\n"));
        assert!(buf.contains(";; ANSWER SECTION:\nexample.com.\t\t300\tIN\tMX\t10 mail.example.com.\n"));
        assert!(buf.contains(";; AUTHORITY SECTION:\n;; ADDITIONAL SECTION:\n"));
    }

    #[test]
    fn test_format_wire() {
        let msg = Message::new(MessageId::from(99), Flags::default().set_query())
            .add_question(Question::new(Name::from_str("example.com.").unwrap(), RecordType::A));
        let bytes = msg.encode().unwrap();

        let mut buf = String::new();
        format_wire(&mut buf, &bytes).unwrap();
        assert!(buf.contains("id: 99"));
        assert!(buf.contains("; example.com.\t\t\tIN\tA\n"));
    }

    #[test]
    fn test_format_wire_trailing_bytes() {
        let msg = Message::new(MessageId::from(99), Flags::default().set_query())
            .add_question(Question::new(Name::from_str("example.com.").unwrap(), RecordType::A));
        let mut bytes = msg.encode().unwrap();
        bytes.extend_from_slice(&[0xde, 0xad]);

        let mut buf = String::new();
        let err = format_wire(&mut buf, &bytes).unwrap_err();
        assert_eq!(ErrorKind::MalformedMessage, err.kind());
        assert!(buf.is_empty());
    }
}

use crate::{Error, Result};

/// One inbound line from the display after integrity checks.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    pub line_number: Option<u32>,
    pub body: String,
    pub checksum: Option<u8>,
}

impl Frame {
    /// Parse a raw line. Blank input yields `Ok(None)`.
    ///
    /// A trailing `*NN` checksum is verified against the XOR of every byte in
    /// front of the `*`; a mismatch is an error and the caller drops the frame.
    pub fn parse(raw: &str) -> Result<Option<Frame>> {
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            return Ok(None);
        }

        let (payload, checksum) = match trimmed.rsplit_once('*') {
            Some((payload, sum)) => {
                let expected = sum.trim().parse::<u8>().map_err(|_| {
                    Error::Parse(format!("truncated or invalid checksum '{sum}'"))
                })?;
                let actual = checksum_of(payload);
                if actual != expected {
                    return Err(Error::ChecksumMismatch { expected, actual });
                }
                (payload, Some(expected))
            }
            None => (trimmed, None),
        };

        let (line_number, body) = split_line_number(payload.trim());
        let body = body.trim();
        if body.is_empty() {
            return Ok(None);
        }

        Ok(Some(Frame {
            line_number,
            body: body.to_string(),
            checksum,
        }))
    }

    /// Whether the sender numbered or checksummed this line.
    pub fn has_integrity_markers(&self) -> bool {
        self.line_number.is_some() || self.checksum.is_some()
    }

    /// Text following `action:` when the display asks for a host action.
    pub fn action(&self) -> Option<&str> {
        self.body
            .find("action:")
            .map(|idx| self.body[idx + "action:".len()..].trim())
    }

    pub fn command(&self) -> Option<GcodeCommand> {
        GcodeCommand::parse(&self.body)
    }
}

/// XOR of every byte, as used by Marlin-style line checksums.
pub fn checksum_of(payload: &str) -> u8 {
    payload.bytes().fold(0u8, |acc, b| acc ^ b)
}

fn split_line_number(payload: &str) -> (Option<u32>, &str) {
    let Some(rest) = payload.strip_prefix(['N', 'n']) else {
        return (None, payload);
    };
    let digits = rest.bytes().take_while(u8::is_ascii_digit).count();
    if digits == 0 {
        return (None, payload);
    }
    match rest[..digits].parse() {
        Ok(number) => (Some(number), &rest[digits..]),
        Err(_) => (None, payload),
    }
}

/// A decoded G/M code with its single-letter parameters.
#[derive(Debug, Clone, PartialEq)]
pub struct GcodeCommand {
    pub letter: char,
    pub number: u16,
    params: Vec<(char, String)>,
}

impl GcodeCommand {
    /// Parse `M104 S200`, `M104S200` and friends. Returns `None` for lines
    /// that do not start with a G/M/T code.
    pub fn parse(body: &str) -> Option<Self> {
        let body = body.trim();
        let first = body.chars().next()?;
        let letter = first.to_ascii_uppercase();
        if !matches!(letter, 'G' | 'M' | 'T') {
            return None;
        }
        let rest = &body[first.len_utf8()..];
        let digits = rest.bytes().take_while(u8::is_ascii_digit).count();
        if digits == 0 {
            return None;
        }
        let number = rest[..digits].parse().ok()?;

        let mut params = Vec::new();
        let mut current: Option<(char, String)> = None;
        for ch in rest[digits..].chars() {
            if ch.is_whitespace() {
                if let Some(param) = current.take() {
                    params.push(param);
                }
            } else if ch.is_ascii_alphabetic()
                && current.as_ref().map_or(true, |(_, v)| !v.is_empty())
            {
                if let Some(param) = current.take() {
                    params.push(param);
                }
                current = Some((ch.to_ascii_uppercase(), String::new()));
            } else if let Some((_, value)) = current.as_mut() {
                value.push(ch);
            }
        }
        if let Some(param) = current.take() {
            params.push(param);
        }

        Some(Self {
            letter,
            number,
            params,
        })
    }

    pub fn is(&self, letter: char, number: u16) -> bool {
        self.letter == letter && self.number == number
    }

    pub fn param(&self, letter: char) -> Option<&str> {
        self.params
            .iter()
            .find(|(l, _)| *l == letter)
            .map(|(_, v)| v.as_str())
    }

    /// Finite numeric value of a parameter; missing or garbage yields `None`.
    pub fn numeric(&self, letter: char) -> Option<f64> {
        self.param(letter)
            .and_then(|raw| raw.parse::<f64>().ok())
            .filter(|v| v.is_finite())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn blank_lines_are_silent() {
        assert_eq!(Frame::parse("").unwrap(), None);
        assert_eq!(Frame::parse("  \r\n").unwrap(), None);
    }

    #[test]
    fn plain_command_has_no_markers() {
        let frame = Frame::parse("M105\r\n").unwrap().unwrap();
        assert_eq!(frame.body, "M105");
        assert!(!frame.has_integrity_markers());
    }

    #[test]
    fn numbered_checksummed_line_verifies() {
        let payload = "N12 M105";
        let raw = format!("{payload}*{}", checksum_of(payload));
        let frame = Frame::parse(&raw).unwrap().unwrap();
        assert_eq!(frame.line_number, Some(12));
        assert_eq!(frame.body, "M105");
        assert!(frame.has_integrity_markers());
    }

    #[test]
    fn checksum_mismatch_is_rejected() {
        let payload = "N3 M114";
        let wrong = checksum_of(payload) ^ 0x01;
        let err = Frame::parse(&format!("{payload}*{wrong}")).unwrap_err();
        assert!(matches!(err, Error::ChecksumMismatch { .. }));
    }

    #[test]
    fn truncated_checksum_is_parse_error() {
        assert!(matches!(
            Frame::parse("N3 M114*"),
            Err(Error::Parse(_))
        ));
    }

    #[test]
    fn action_text_is_extracted() {
        let frame = Frame::parse("M118 action:remote pause").unwrap().unwrap();
        assert_eq!(frame.action(), Some("remote pause"));
    }

    #[test]
    fn gcode_params_parse_spaced_and_compact() {
        let spaced = GcodeCommand::parse("M104 S200 T0").unwrap();
        assert!(spaced.is('M', 104));
        assert_eq!(spaced.numeric('S'), Some(200.0));
        assert_eq!(spaced.param('T'), Some("0"));

        let compact = GcodeCommand::parse("m106s128").unwrap();
        assert!(compact.is('M', 106));
        assert_eq!(compact.numeric('S'), Some(128.0));
    }

    #[test]
    fn malformed_numeric_is_none() {
        let cmd = GcodeCommand::parse("M104 Shot").unwrap();
        assert_eq!(cmd.numeric('S'), None);
        let bare = GcodeCommand::parse("M104 S").unwrap();
        assert_eq!(bare.numeric('S'), None);
    }

    #[test]
    fn non_gcode_lines_do_not_parse() {
        assert!(GcodeCommand::parse("hello").is_none());
        assert!(GcodeCommand::parse("M").is_none());
    }
}

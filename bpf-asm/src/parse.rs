//! Assembly of the `-d` and `-dd` textual forms back into instructions.

use crate::{Instruction, Opcode};

use core::fmt;

/// Malformed assembler input.
///
/// Carries the 1-based line number of the offending line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParseError {
    /// 1-based line number.
    pub line: usize,
    /// What went wrong.
    pub message: String,
}

impl ParseError {
    fn new(line: usize, message: impl Into<String>) -> Self {
        Self {
            line,
            message: message.into(),
        }
    }
}

impl fmt::Display for ParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "parse error at line {}: {}", self.line, self.message)
    }
}

impl std::error::Error for ParseError {}

/// Parses a program in either textual form, auto-detecting which.
///
/// The first significant line decides: `{` means the `-dd` hex form, `(`
/// the `-d` form. Blank lines and lines starting with `Warning:` are
/// ignored in both.
pub fn parse_program(text: &str) -> Result<Vec<Instruction>, ParseError> {
    for (number, line) in significant_lines(text) {
        return match line.as_bytes().first() {
            Some(b'{') => parse_hex(text),
            Some(b'(') => parse_text(text),
            _ => Err(ParseError::new(
                number,
                format!("cannot detect program format from {line:?}"),
            )),
        };
    }
    Err(ParseError::new(0, "no instructions in input"))
}

/// Parses the `-dd` form: one `{ 0xOP, JT, JF, 0xKKKKKKKK },` per line.
pub fn parse_hex(text: &str) -> Result<Vec<Instruction>, ParseError> {
    significant_lines(text)
        .map(|(number, line)| parse_hex_line(number, line))
        .collect()
}

/// Parses the `-d` form: one `(NNN) mnemonic operands` per line.
pub fn parse_text(text: &str) -> Result<Vec<Instruction>, ParseError> {
    let mut instructions = Vec::new();
    for (number, line) in significant_lines(text) {
        let index = instructions.len();
        instructions.push(parse_text_line(number, index, line)?);
    }
    Ok(instructions)
}

fn significant_lines(text: &str) -> impl Iterator<Item = (usize, &str)> {
    text.lines()
        .enumerate()
        .map(|(i, line)| (i + 1, line.trim()))
        .filter(|(_, line)| !line.is_empty() && !line.starts_with("Warning:"))
}

fn parse_hex_line(number: usize, line: &str) -> Result<Instruction, ParseError> {
    let body = line
        .strip_suffix(',')
        .unwrap_or(line)
        .trim()
        .strip_prefix('{')
        .and_then(|s| s.strip_suffix('}'))
        .ok_or_else(|| ParseError::new(number, format!("expected {{ .. }}, got {line:?}")))?;

    let fields: Vec<u64> = body
        .split(',')
        .map(|field| parse_number(number, field.trim()))
        .collect::<Result<_, _>>()?;
    let [op, jt, jf, k]: [u64; 4] = fields
        .try_into()
        .map_err(|_| ParseError::new(number, "expected four fields: opcode, jt, jf, k"))?;

    let narrow = |value: u64, what: &str| -> Result<u8, ParseError> {
        u8::try_from(value)
            .map_err(|_| ParseError::new(number, format!("{what} {value} does not fit a byte")))
    };
    let k = u32::try_from(k)
        .map_err(|_| ParseError::new(number, format!("k {k:#x} does not fit 32 bits")))?;

    Ok(Instruction::from_parts(
        narrow(op, "opcode")?,
        narrow(jt, "jt")?,
        narrow(jf, "jf")?,
        k,
    ))
}

fn parse_text_line(
    number: usize,
    index: usize,
    line: &str,
) -> Result<Instruction, ParseError> {
    let mut tokens = line.split_whitespace();

    let label = tokens
        .next()
        .and_then(|t| t.strip_prefix('('))
        .and_then(|t| t.strip_suffix(')'))
        .ok_or_else(|| ParseError::new(number, "expected a (NNN) instruction label"))?;
    let declared: usize = label
        .parse()
        .map_err(|_| ParseError::new(number, format!("bad instruction label ({label})")))?;
    if declared != index {
        return Err(ParseError::new(
            number,
            format!("instruction label ({declared}) out of sequence, expected ({index})"),
        ));
    }

    let mnemonic = tokens
        .next()
        .ok_or_else(|| ParseError::new(number, "missing mnemonic"))?;
    let rest: Vec<&str> = tokens.collect();

    match mnemonic {
        "jeq" | "jgt" | "jge" | "jset" => {
            parse_cond_jump(number, index, mnemonic, &rest)
        }
        "ja" | "jmp" => {
            let offset = parse_signed(number, expect_one(number, &rest)?)?;
            Ok(Instruction::new(Opcode::Ja, 0, 0, offset as u32))
        }
        "ret" => match expect_one(number, &rest)? {
            "a" => Ok(Instruction::new(Opcode::RetA, 0, 0, 0)),
            imm => {
                let k = parse_immediate(number, imm)?;
                Ok(Instruction::new(Opcode::RetK, 0, 0, k))
            }
        },
        "ext" => parse_ext(number, &rest),
        _ => parse_plain(number, mnemonic, &rest),
    }
}

/// Mnemonics whose opcode depends on the operand shape, plus everything
/// with at most one operand.
fn parse_plain(
    number: usize,
    mnemonic: &str,
    rest: &[&str],
) -> Result<Instruction, ParseError> {
    // `[x + 12]` tokenizes into three pieces; fold the operand back together.
    let operand = rest.concat();
    let operand = operand.as_str();

    let abs = |op: Opcode| -> Result<Instruction, ParseError> {
        let k = parse_bracketed(number, operand, "[", "]")?;
        Ok(Instruction::new(op, 0, 0, k))
    };
    let ind = |op: Opcode| -> Result<Instruction, ParseError> {
        let k = parse_bracketed(number, operand, "[x+", "]")?;
        Ok(Instruction::new(op, 0, 0, k))
    };
    let mem = |op: Opcode| -> Result<Instruction, ParseError> {
        let k = parse_bracketed(number, operand, "M[", "]")?;
        Ok(Instruction::new(op, 0, 0, k))
    };
    let msh = |op: Opcode| -> Result<Instruction, ParseError> {
        let k = parse_bracketed(number, operand, "4*([", "]&0xf)")?;
        Ok(Instruction::new(op, 0, 0, k))
    };
    let imm = |op: Opcode| -> Result<Instruction, ParseError> {
        let k = parse_immediate(number, operand)?;
        Ok(Instruction::new(op, 0, 0, k))
    };
    let bare = |op: Opcode| Ok(Instruction::new(op, 0, 0, 0));

    match (mnemonic, operand) {
        ("ld", "len" | "#pktlen") => bare(Opcode::LdLen),
        ("ldx", "len" | "#pktlen") => bare(Opcode::LdxLen),
        ("ld", o) if o.starts_with("M[") => mem(Opcode::LdMem),
        ("ldx", o) if o.starts_with("M[") => mem(Opcode::LdxMem),
        ("ld", o) if o.starts_with('#') => imm(Opcode::LdImm),
        ("ldx", o) if o.starts_with('#') => imm(Opcode::LdxImm),
        ("ld", o) if o.starts_with("[x+") => ind(Opcode::LdIndW),
        ("ldh", o) if o.starts_with("[x+") => ind(Opcode::LdIndH),
        ("ldb", o) if o.starts_with("[x+") => ind(Opcode::LdIndB),
        ("ld" | "ldb", o) if o.starts_with("4*([") => msh(Opcode::LdMsh),
        ("ldx" | "ldxb", o) if o.starts_with("4*([") => msh(Opcode::LdxMsh),
        ("ld", _) => abs(Opcode::LdAbsW),
        ("ldh", _) => abs(Opcode::LdAbsH),
        ("ldb", _) => abs(Opcode::LdAbsB),
        ("st", _) => mem(Opcode::St),
        ("stx", _) => mem(Opcode::Stx),
        ("add", "x") => bare(Opcode::AddX),
        ("sub", "x") => bare(Opcode::SubX),
        ("mul", "x") => bare(Opcode::MulX),
        ("div", "x") => bare(Opcode::DivX),
        ("mod", "x") => bare(Opcode::ModX),
        ("and", "x") => bare(Opcode::AndX),
        ("or", "x") => bare(Opcode::OrX),
        ("xor", "x") => bare(Opcode::XorX),
        ("lsh", "x") => bare(Opcode::LshX),
        ("rsh", "x") => bare(Opcode::RshX),
        ("add", _) => imm(Opcode::AddK),
        ("sub", _) => imm(Opcode::SubK),
        ("mul", _) => imm(Opcode::MulK),
        ("div", _) => imm(Opcode::DivK),
        ("mod", _) => imm(Opcode::ModK),
        ("and", _) => imm(Opcode::AndK),
        ("or", _) => imm(Opcode::OrK),
        ("xor", _) => imm(Opcode::XorK),
        ("lsh", _) => imm(Opcode::LshK),
        ("rsh", _) => imm(Opcode::RshK),
        ("neg", _) => bare(Opcode::Neg),
        ("tax", _) => bare(Opcode::Tax),
        ("txa", _) => bare(Opcode::Txa),
        ("chk_l3_csum", _) => bare(Opcode::ChkL3Csum),
        ("chk_l4_csum", _) => bare(Opcode::ChkL4Csum),
        ("chk_trunc", _) => bare(Opcode::ChkTrunc),
        ("chk_frame_len", o) => {
            let k = o
                .strip_prefix(">=")
                .ok_or_else(|| ParseError::new(number, format!("expected >=N, got {o:?}")))
                .and_then(|n| parse_number(number, n))?;
            let k = narrow_u32(number, k)?;
            Ok(Instruction::new(Opcode::ChkFrameLen, 0, 0, k))
        }
        ("chk_crc", _) => {
            let offset = narrow_u32(number, parse_keyed(number, rest, "offset")?)?;
            let len = parse_keyed(number, rest, "len")?;
            let len = u16::try_from(len).map_err(|_| {
                ParseError::new(number, format!("len {len} does not fit 16 bits"))
            })?;
            Ok(Instruction::new(
                Opcode::ChkCrc,
                (len >> 8) as u8,
                len as u8,
                offset,
            ))
        }
        ("chk_proto_loc", _) => {
            let layer = parse_keyed(number, rest, "layer")?;
            let layer = u8::try_from(layer).map_err(|_| {
                ParseError::new(number, format!("layer {layer} does not fit a byte"))
            })?;
            let offset = narrow_u32(number, parse_keyed(number, rest, "offset")?)?;
            Ok(Instruction::new(Opcode::ChkProtoLoc, layer, 0, offset))
        }
        _ => Err(ParseError::new(
            number,
            format!("unknown mnemonic {mnemonic:?}"),
        )),
    }
}

fn parse_cond_jump(
    number: usize,
    index: usize,
    mnemonic: &str,
    rest: &[&str],
) -> Result<Instruction, ParseError> {
    let &[comparand, jt_kw, jt, jf_kw, jf] = rest else {
        return Err(ParseError::new(
            number,
            format!("expected `{mnemonic} <operand> jt N jf N`"),
        ));
    };
    if jt_kw != "jt" || jf_kw != "jf" {
        return Err(ParseError::new(number, "expected jt/jf branch targets"));
    }

    // Targets are absolute indices in the text; the encoding wants offsets
    // relative to the next instruction.
    let branch = |target: &str| -> Result<u8, ParseError> {
        let target: usize = target
            .parse()
            .map_err(|_| ParseError::new(number, format!("bad branch target {target:?}")))?;
        let offset = target
            .checked_sub(index + 1)
            .ok_or_else(|| ParseError::new(number, "branch target precedes the jump"))?;
        u8::try_from(offset).map_err(|_| {
            ParseError::new(number, format!("branch to {target} is out of reach"))
        })
    };
    let jt = branch(jt)?;
    let jf = branch(jf)?;

    let (op_k, op_x) = match mnemonic {
        "jeq" => (Opcode::JeqK, Opcode::JeqX),
        "jgt" => (Opcode::JgtK, Opcode::JgtX),
        "jge" => (Opcode::JgeK, Opcode::JgeX),
        _ => (Opcode::JsetK, Opcode::JsetX),
    };

    if comparand == "x" {
        Ok(Instruction::new(op_x, jt, jf, 0))
    } else {
        let k = parse_immediate(number, comparand)?;
        Ok(Instruction::new(op_k, jt, jf, k))
    }
}

fn parse_ext(number: usize, rest: &[&str]) -> Result<Instruction, ParseError> {
    let &[op, dst, src, imm] = rest else {
        return Err(ParseError::new(
            number,
            "expected `ext 0xNN dst=N src=N #k`",
        ));
    };
    let op = parse_number(number, op).and_then(|v| {
        u8::try_from(v)
            .map_err(|_| ParseError::new(number, format!("opcode {v} does not fit a byte")))
    })?;
    let field = |token: &str, key: &str| -> Result<u8, ParseError> {
        let value = token
            .strip_prefix(key)
            .and_then(|t| t.strip_prefix('='))
            .ok_or_else(|| ParseError::new(number, format!("expected {key}=N")))?;
        parse_number(number, value).and_then(|v| {
            u8::try_from(v).map_err(|_| {
                ParseError::new(number, format!("{key} {v} does not fit a byte"))
            })
        })
    };
    let imm = parse_immediate(number, imm)?;
    Ok(Instruction::from_parts(
        op,
        field(dst, "dst")?,
        field(src, "src")?,
        imm,
    ))
}

fn expect_one<'a>(number: usize, rest: &[&'a str]) -> Result<&'a str, ParseError> {
    match rest {
        &[single] => Ok(single),
        _ => Err(ParseError::new(number, "expected exactly one operand")),
    }
}

fn parse_keyed(number: usize, rest: &[&str], key: &str) -> Result<u64, ParseError> {
    rest.iter()
        .find_map(|token| token.strip_prefix(key).and_then(|t| t.strip_prefix('=')))
        .ok_or_else(|| ParseError::new(number, format!("missing {key}=N operand")))
        .and_then(|value| parse_number(number, value))
}

fn parse_bracketed(
    number: usize,
    operand: &str,
    open: &str,
    close: &str,
) -> Result<u32, ParseError> {
    operand
        .strip_prefix(open)
        .and_then(|s| s.strip_suffix(close))
        .ok_or_else(|| {
            ParseError::new(number, format!("expected {open}k{close}, got {operand:?}"))
        })
        .and_then(|k| parse_number(number, k))
        .and_then(|k| narrow_u32(number, k))
}

fn parse_immediate(number: usize, token: &str) -> Result<u32, ParseError> {
    let digits = token
        .strip_prefix('#')
        .ok_or_else(|| ParseError::new(number, format!("expected #k, got {token:?}")))?;
    parse_number(number, digits).and_then(|k| narrow_u32(number, k))
}

fn parse_signed(number: usize, token: &str) -> Result<i32, ParseError> {
    let (negative, digits) = match token.as_bytes().first() {
        Some(b'+') => (false, &token[1..]),
        Some(b'-') => (true, &token[1..]),
        _ => (false, token),
    };
    let magnitude = parse_number(number, digits)?;
    let magnitude = i64::try_from(magnitude)
        .map_err(|_| ParseError::new(number, format!("offset {token:?} overflows")))?;
    i32::try_from(if negative { -magnitude } else { magnitude })
        .map_err(|_| ParseError::new(number, format!("offset {token:?} overflows")))
}

fn parse_number(number: usize, digits: &str) -> Result<u64, ParseError> {
    let digits = digits.trim();
    let parsed = match digits.strip_prefix("0x").or_else(|| digits.strip_prefix("0X")) {
        Some(hex) => u64::from_str_radix(hex, 16),
        None => digits.parse(),
    };
    parsed.map_err(|_| ParseError::new(number, format!("bad number {digits:?}")))
}

fn narrow_u32(number: usize, value: u64) -> Result<u32, ParseError> {
    u32::try_from(value)
        .map_err(|_| ParseError::new(number, format!("value {value:#x} does not fit 32 bits")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::op;

    #[test]
    fn hex_lines_parse_with_and_without_trailing_comma() {
        let program = "\
            { 0x28, 0, 0, 0x0000000c },\n\
            { 0x15, 0, 1, 0x00000800 },\n\
            { 0x06, 0, 0, 0x00040000 }\n";
        let parsed = parse_hex(program).unwrap();
        assert_eq!(
            parsed,
            vec![op::ldh(12), op::jeq_k(0x0800, 0, 1), op::ret_k(0x0004_0000)]
        );
    }

    #[test]
    fn warnings_and_blanks_are_skipped() {
        let program = "\
            Warning: assuming Ethernet\n\
            \n\
            { 0x06, 0, 0, 0x00000000 },\n";
        assert_eq!(parse_program(program).unwrap(), vec![op::ret_k(0)]);
    }

    #[test]
    fn text_lines_resolve_absolute_branch_targets() {
        let program = "\
            (000) ldh            [12]\n\
            (001) jeq            #0x800 jt 2 jf 3\n\
            (002) ret            #262144\n\
            (003) ret            #0\n";
        let parsed = parse_text(program).unwrap();
        assert_eq!(parsed[1], op::jeq_k(0x0800, 0, 1));
    }

    #[test]
    fn context_dependent_loads_disambiguate() {
        let program = "\
            (000) ld             #42\n\
            (001) ld             [14]\n\
            (002) ld             M[3]\n\
            (003) ld             len\n\
            (004) ldxb           4*([14]&0xf)\n\
            (005) ldh            [x + 2]\n\
            (006) ret            a\n";
        let parsed = parse_text(program).unwrap();
        assert_eq!(
            parsed,
            vec![
                op::ld_imm(42),
                op::ld(14),
                op::ld_mem(3),
                op::ld_len(),
                op::ldx_msh(14),
                op::ldh_ind(2),
                op::ret_a(),
            ]
        );
    }

    #[test]
    fn format_detection_rejects_garbage() {
        let err = parse_program("ldh [12]\n").unwrap_err();
        assert_eq!(err.line, 1);
    }

    #[test]
    fn backward_branch_targets_are_unencodable() {
        let program = "\
            (000) ldh            [12]\n\
            (001) jeq            #0x800 jt 0 jf 2\n\
            (002) ret            #0\n";
        let err = parse_text(program).unwrap_err();
        assert_eq!(err.line, 2);
    }
}

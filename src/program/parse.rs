//! Text listing parser
//!
//! One instruction per line, whitespace-separated; `#` starts a comment.
//!
//! ```text
//! declare x 4 = 5          # int x = 5;
//! addr p x                 # p = &x
//! malloc a 12 elem 4       # int *a = malloc(12)
//! calloc z 3 4             # z = calloc(3, 4)
//! add q a 2                # q = a + 2
//! field f a 4 4            # f = &a->second_field
//! write q 30               # *q = 30
//! read v q                 # v = *q
//! call g n:4=v -> r        # r = g(v)
//! ret p
//! free a
//! ```

use super::{Instruction, Operand, Param, Program, ProgramError, NULL_TOKEN};

/// Parse a whole listing
pub fn parse_listing(source: &str) -> Result<Program, ProgramError> {
    let mut instructions = Vec::new();
    for (i, raw) in source.lines().enumerate() {
        let text = match raw.find('#') {
            Some(pos) => &raw[..pos],
            None => raw,
        };
        let mut line = LineParser::new(text, i + 1);
        if line.is_at_end() {
            continue;
        }
        instructions.push(line.parse_instruction()?);
    }
    Ok(Program::new(instructions))
}

struct LineParser<'a> {
    tokens: Vec<&'a str>,
    position: usize,
    line: usize,
}

impl<'a> LineParser<'a> {
    fn new(text: &'a str, line: usize) -> Self {
        LineParser {
            tokens: text.split_whitespace().collect(),
            position: 0,
            line,
        }
    }

    fn parse_instruction(&mut self) -> Result<Instruction, ProgramError> {
        let mnemonic = self.next("an instruction")?;
        let instr = match mnemonic {
            "declare" => {
                let name = self.expect_identifier()?;
                let size = self.expect_usize("slot size")?;
                let init = if self.eat("=") {
                    Some(self.expect_operand()?)
                } else {
                    None
                };
                Instruction::Declare { name, size, init }
            }
            "addr" => {
                let dest = self.expect_identifier()?;
                let slot = self.expect_identifier()?;
                let elem_size = if self.eat("elem") {
                    Some(self.expect_usize("element size")?)
                } else {
                    None
                };
                Instruction::AddressOf {
                    dest,
                    slot,
                    elem_size,
                }
            }
            "read" => Instruction::DereferenceRead {
                dest: self.expect_identifier()?,
                ptr: self.expect_identifier()?,
            },
            "write" => Instruction::DereferenceWrite {
                ptr: self.expect_identifier()?,
                value: self.expect_operand()?,
            },
            "add" => Instruction::PointerAdd {
                dest: self.expect_identifier()?,
                src: self.expect_identifier()?,
                offset: self.expect_i64("offset")?,
            },
            "field" => Instruction::FieldAccess {
                dest: self.expect_identifier()?,
                src: self.expect_identifier()?,
                offset: self.expect_usize("field offset")? as u64,
                size: self.expect_usize("field size")?,
            },
            "call" => {
                let function = self.expect_identifier()?;
                let mut params = Vec::new();
                let mut result = None;
                while !self.is_at_end() {
                    if self.eat("->") {
                        result = Some(self.expect_identifier()?);
                        break;
                    }
                    params.push(self.expect_param()?);
                }
                Instruction::Call {
                    function,
                    params,
                    result,
                }
            }
            "ret" => {
                let value = if self.is_at_end() {
                    None
                } else {
                    Some(self.expect_operand()?)
                };
                Instruction::Return { value }
            }
            "malloc" => {
                let dest = self.expect_identifier()?;
                let size = self.expect_usize("allocation size")?;
                let elem_size = if self.eat("elem") {
                    self.expect_usize("element size")?
                } else {
                    1
                };
                Instruction::Malloc {
                    dest,
                    size,
                    elem_size,
                }
            }
            "calloc" => Instruction::Calloc {
                dest: self.expect_identifier()?,
                count: self.expect_usize("element count")?,
                size: self.expect_usize("element size")?,
            },
            "free" => Instruction::Free {
                ptr: self.expect_identifier()?,
            },
            other => return Err(self.error(format!("unknown instruction '{}'", other))),
        };

        if let Some(extra) = self.tokens.get(self.position) {
            return Err(self.error(format!("unexpected '{}' after {}", extra, mnemonic)));
        }
        Ok(instr)
    }

    /// `name:size=operand`
    fn expect_param(&mut self) -> Result<Param, ProgramError> {
        let token = self.next("a parameter")?;
        let malformed = || format!("expected parameter 'name:size=value', found '{}'", token);
        let (name, rest) = token.split_once(':').ok_or_else(|| self.error(malformed()))?;
        let (size, arg) = rest.split_once('=').ok_or_else(|| self.error(malformed()))?;
        if !is_identifier(name) {
            return Err(self.error(malformed()));
        }
        Ok(Param {
            name: name.to_string(),
            size: parse_number(size)
                .and_then(|n| usize::try_from(n).ok())
                .ok_or_else(|| self.error(malformed()))?,
            arg: self.operand(arg)?,
        })
    }

    fn expect_operand(&mut self) -> Result<Operand, ProgramError> {
        let token = self.next("a value")?;
        self.operand(token)
    }

    fn operand(&self, token: &str) -> Result<Operand, ProgramError> {
        if token == NULL_TOKEN {
            Ok(Operand::Null)
        } else if let Some(n) = parse_number(token) {
            Ok(Operand::Const(n))
        } else if is_identifier(token) {
            Ok(Operand::Handle(token.to_string()))
        } else {
            Err(self.error(format!("expected a value, found '{}'", token)))
        }
    }

    fn expect_identifier(&mut self) -> Result<String, ProgramError> {
        let token = self.next("an identifier")?;
        if is_identifier(token) && token != NULL_TOKEN {
            Ok(token.to_string())
        } else {
            Err(self.error(format!("expected identifier, found '{}'", token)))
        }
    }

    fn expect_usize(&mut self, what: &str) -> Result<usize, ProgramError> {
        let token = self.next(what)?;
        parse_number(token)
            .and_then(|n| usize::try_from(n).ok())
            .ok_or_else(|| self.error(format!("expected {}, found '{}'", what, token)))
    }

    fn expect_i64(&mut self, what: &str) -> Result<i64, ProgramError> {
        let token = self.next(what)?;
        parse_number(token).ok_or_else(|| self.error(format!("expected {}, found '{}'", what, token)))
    }

    /// Consume `keyword` if it is the next token
    fn eat(&mut self, keyword: &str) -> bool {
        if self.tokens.get(self.position) == Some(&keyword) {
            self.position += 1;
            true
        } else {
            false
        }
    }

    fn next(&mut self, what: &str) -> Result<&'a str, ProgramError> {
        match self.tokens.get(self.position) {
            Some(&token) => {
                self.position += 1;
                Ok(token)
            }
            None => Err(self.error(format!("expected {}, found end of line", what))),
        }
    }

    fn is_at_end(&self) -> bool {
        self.position >= self.tokens.len()
    }

    fn error(&self, message: String) -> ProgramError {
        ProgramError::Parse {
            line: self.line,
            message,
        }
    }
}

fn is_identifier(token: &str) -> bool {
    let mut chars = token.chars();
    chars
        .next()
        .is_some_and(|c| c.is_ascii_alphabetic() || c == '_')
        && chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}

/// Decimal or `0x` hexadecimal, optionally negative
fn parse_number(token: &str) -> Option<i64> {
    let (negative, digits) = match token.strip_prefix('-') {
        Some(rest) => (true, rest),
        None => (false, token),
    };
    let magnitude = match digits.strip_prefix("0x").or_else(|| digits.strip_prefix("0X")) {
        Some(hex) => i64::from_str_radix(hex, 16).ok()?,
        None if !digits.is_empty() && digits.bytes().all(|b| b.is_ascii_digit()) => {
            digits.parse::<i64>().ok()?
        }
        None => return None,
    };
    Some(if negative { -magnitude } else { magnitude })
}

//! Textual IR parsing.
//!
//! The code generator and the backend driver agree on a line-oriented text
//! format (spec §6) as their one stable boundary. This module owns the
//! backend's *own* representation of that text — deliberately not shared
//! with the code generator's in-memory builder, so the two sides can only
//! communicate through the documented grammar:
//!
//! ```text
//! function <retty> $<name>(<ty> %<param>, ...)
//! @<label>
//!   %<dst> = <op> <ty> %<a>, %<b>
//!   jmp @L
//!   jnz %t, @L1, @L2
//!   ret [%t]
//! data $<name> = { <ty> <value>, ... }
//! ```
//!
//! Types: `w` word (i32), `l` long (i64), `s` single, `d` double, `h` half
//! (i16), `b` byte (i8); aggregates by struct name; opaque pointers are `l`.

use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum IrType {
    Byte,
    Half,
    Word,
    Long,
    Single,
    Double,
    /// A named aggregate (UDT/class layout or opaque handle), carried by
    /// pointer at the IR level the same way `l` is.
    Struct,
}

impl IrType {
    pub fn from_code(code: &str) -> Option<IrType> {
        match code {
            "b" => Some(IrType::Byte),
            "h" => Some(IrType::Half),
            "w" => Some(IrType::Word),
            "l" => Some(IrType::Long),
            "s" => Some(IrType::Single),
            "d" => Some(IrType::Double),
            other if other.starts_with('%') => Some(IrType::Struct),
            _ => None,
        }
    }

    /// Size in bytes, used by the register allocator to decide spill-slot
    /// width and by the backend to pick register class (GPR vs FPR).
    pub fn size_bytes(self) -> u32 {
        match self {
            IrType::Byte => 1,
            IrType::Half => 2,
            IrType::Word => 4,
            IrType::Long => 8,
            IrType::Single => 4,
            IrType::Double => 8,
            IrType::Struct => 8, // always passed/held by pointer
        }
    }

    pub fn is_float(self) -> bool {
        matches!(self, IrType::Single | IrType::Double)
    }
}

impl fmt::Display for IrType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let code = match self {
            IrType::Byte => "b",
            IrType::Half => "h",
            IrType::Word => "w",
            IrType::Long => "l",
            IrType::Single => "s",
            IrType::Double => "d",
            IrType::Struct => "%agg",
        };
        write!(f, "{}", code)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Temp(String),
    IntConst(i64),
    FloatConst(f64),
    Global(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinOp {
    Add,
    Sub,
    Mul,
    Div,
    Rem,
    UDiv,
    URem,
    Shl,
    Shr,
    Sar,
    And,
    Or,
    Xor,
    /// Fused multiply-add/subtract, emitted when codegen matches the
    /// `acc +/- a*b` pattern (spec §4.6.3).
    Fmadd,
    Fmsub,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CmpOp {
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
    /// Unsigned variants, used for pointer/bounds comparisons.
    ULt,
    ULe,
    UGt,
    UGe,
}

#[derive(Debug, Clone)]
pub enum Inst {
    BinOp {
        dst: String,
        ty: IrType,
        op: BinOp,
        lhs: Value,
        rhs: Value,
    },
    Cmp {
        dst: String,
        ty: IrType,
        op: CmpOp,
        lhs: Value,
        rhs: Value,
    },
    /// Integer <-> float conversion (`sitof`/`ftosi`), sign/zero extension,
    /// and truncation all share this shape: one source, one destination,
    /// both typed.
    Convert {
        dst: String,
        from_ty: IrType,
        to_ty: IrType,
        signed: bool,
        src: Value,
    },
    Load {
        dst: String,
        ty: IrType,
        addr: Value,
    },
    Store {
        ty: IrType,
        addr: Value,
        value: Value,
    },
    /// `add base, offset` address arithmetic (spec §4.6.3's array/UDT base
    /// pointer materialization relies on this being reused, not re-emitted,
    /// across fields of the same access chain).
    AddrOf {
        dst: String,
        base: Value,
        offset: Value,
    },
    Call {
        dst: Option<String>,
        ret_ty: Option<IrType>,
        callee: String,
        args: Vec<(IrType, Value)>,
        indirect: bool,
    },
    Phi {
        dst: String,
        ty: IrType,
        incoming: Vec<(String, Value)>,
    },
}

#[derive(Debug, Clone)]
pub enum Terminator {
    Jmp(String),
    Jnz { cond: Value, if_true: String, if_false: String },
    Ret(Option<(IrType, Value)>),
    /// Dense switch lowering for SELECT CASE blocks.
    Switch { value: Value, cases: Vec<(i64, String)>, default: String },
}

#[derive(Debug, Clone)]
pub struct Block {
    pub label: String,
    pub insts: Vec<Inst>,
    pub terminator: Terminator,
}

#[derive(Debug, Clone)]
pub struct Param {
    pub name: String,
    pub ty: IrType,
}

#[derive(Debug, Clone)]
pub struct Function {
    pub name: String,
    pub ret_ty: Option<IrType>,
    pub params: Vec<Param>,
    pub blocks: Vec<Block>,
}

impl Function {
    pub fn entry(&self) -> &Block {
        &self.blocks[0]
    }

    pub fn block(&self, label: &str) -> Option<&Block> {
        self.blocks.iter().find(|b| b.label == label)
    }
}

#[derive(Debug, Clone)]
pub struct DataItem {
    pub name: String,
    pub entries: Vec<(IrType, DataValue)>,
}

#[derive(Debug, Clone)]
pub enum DataValue {
    Int(i64),
    Float(f64),
    /// A single byte, used for the `b "...", b 0` string-literal encoding
    /// spec §6 documents.
    Byte(u8),
}

#[derive(Debug, Clone, Default)]
pub struct Module {
    pub data: Vec<DataItem>,
    pub functions: Vec<Function>,
}

impl Module {
    pub fn function(&self, name: &str) -> Option<&Function> {
        self.functions.iter().find(|f| f.name == name)
    }
}

/// An error produced while parsing IR text. Carries enough context (line
/// number and the offending line) to name the function under parse in the
/// diagnostic, matching the backend driver's failure-mode contract (spec
/// §4.7): "abort with a diagnostic that identifies the function and
/// instruction."
#[derive(Debug, Clone)]
pub struct ParseError {
    pub line: usize,
    pub context: String,
    pub message: String,
}

impl fmt::Display for ParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "IR parse error at line {} (in {}): {}",
            self.line, self.context, self.message
        )
    }
}

impl std::error::Error for ParseError {}

pub fn parse(text: &str) -> Result<Module, ParseError> {
    Parser::new(text).parse_module()
}

struct Parser<'a> {
    lines: Vec<&'a str>,
    pos: usize,
}

impl<'a> Parser<'a> {
    fn new(text: &'a str) -> Self {
        Parser {
            lines: text.lines().collect(),
            pos: 0,
        }
    }

    fn err(&self, context: &str, message: impl Into<String>) -> ParseError {
        ParseError {
            line: self.pos + 1,
            context: context.to_string(),
            message: message.into(),
        }
    }

    fn peek(&self) -> Option<&'a str> {
        self.lines.get(self.pos).copied()
    }

    fn next_nonblank(&mut self) -> Option<&'a str> {
        while let Some(line) = self.peek() {
            let trimmed = line.trim();
            if trimmed.is_empty() {
                self.pos += 1;
                continue;
            }
            return Some(trimmed);
        }
        None
    }

    fn parse_module(&mut self) -> Result<Module, ParseError> {
        let mut module = Module::default();
        while let Some(line) = self.next_nonblank() {
            if line.starts_with("data ") {
                module.data.push(self.parse_data_item()?);
            } else if line.starts_with("function ") {
                module.functions.push(self.parse_function()?);
            } else {
                return Err(self.err("module", format!("unexpected top-level line '{}'", line)));
            }
        }
        Ok(module)
    }

    fn parse_data_item(&mut self) -> Result<DataItem, ParseError> {
        let line = self.next_nonblank().unwrap();
        self.pos += 1;
        let rest = line.strip_prefix("data ").unwrap();
        let (name_part, body) = rest
            .split_once('=')
            .ok_or_else(|| self.err("data", "expected '=' in data item"))?;
        let name = name_part.trim().trim_start_matches('$').to_string();
        let body = body.trim().trim_start_matches('{').trim_end_matches('}');
        let mut entries = Vec::new();
        for entry in split_top_level_commas(body) {
            let entry = entry.trim();
            if entry.is_empty() {
                continue;
            }
            let mut parts = entry.splitn(2, ' ');
            let ty_code = parts.next().unwrap_or_default();
            let value = parts.next().unwrap_or_default().trim();
            let ty = IrType::from_code(ty_code)
                .ok_or_else(|| self.err("data", format!("unknown data type '{}'", ty_code)))?;
            let data_value = if let Some(stripped) = value.strip_prefix('"') {
                let s = stripped.trim_end_matches('"');
                // Each character becomes its own byte entry under this type,
                // matching the `b "...", b 0` aggregate string encoding.
                for byte in s.bytes() {
                    entries.push((ty, DataValue::Byte(byte)));
                }
                continue;
            } else if value.contains('.') || value.contains('e') {
                DataValue::Float(value.parse().map_err(|_| {
                    self.err("data", format!("invalid float literal '{}'", value))
                })?)
            } else {
                DataValue::Int(value.parse().map_err(|_| {
                    self.err("data", format!("invalid int literal '{}'", value))
                })?)
            };
            entries.push((ty, data_value));
        }
        Ok(DataItem { name, entries })
    }

    fn parse_function(&mut self) -> Result<Function, ParseError> {
        let sig_line = self.next_nonblank().unwrap();
        self.pos += 1;
        let (name, ret_ty, params) = parse_signature(sig_line)
            .map_err(|m| self.err("function signature", m))?;
        let mut blocks = Vec::new();
        while let Some(line) = self.peek() {
            let trimmed = line.trim();
            if trimmed.is_empty() {
                self.pos += 1;
                continue;
            }
            if trimmed.starts_with("function ") || trimmed.starts_with("data ") {
                break;
            }
            blocks.push(self.parse_block(&name)?);
        }
        if blocks.is_empty() {
            return Err(self.err(&name, "function has no blocks"));
        }
        Ok(Function {
            name,
            ret_ty,
            params,
            blocks,
        })
    }

    fn parse_block(&mut self, func_name: &str) -> Result<Block, ParseError> {
        let label_line = self.next_nonblank().unwrap();
        if !label_line.starts_with('@') {
            return Err(self.err(func_name, format!("expected block label, got '{}'", label_line)));
        }
        let label = label_line.trim_start_matches('@').to_string();
        self.pos += 1;

        let mut insts = Vec::new();
        loop {
            let line = match self.peek() {
                Some(l) => l.trim(),
                None => return Err(self.err(func_name, "function ended without a terminator")),
            };
            if line.is_empty() {
                self.pos += 1;
                continue;
            }
            if line.starts_with('@') || line.starts_with("function ") || line.starts_with("data ")
            {
                return Err(self.err(func_name, format!("block '{}' missing terminator", label)));
            }
            self.pos += 1;
            if let Some(terminator) = parse_terminator(line) {
                return Ok(Block {
                    label,
                    insts,
                    terminator: terminator.map_err(|m| self.err(func_name, m))?,
                });
            }
            insts.push(parse_inst(line).map_err(|m| self.err(func_name, m))?);
        }
    }
}

/// Splits a comma-separated list while respecting that no element here
/// nests commas itself (the grammar is flat), kept as its own helper so the
/// call sites stay readable.
fn split_top_level_commas(s: &str) -> Vec<&str> {
    s.split(',').collect()
}

fn parse_value(text: &str) -> Value {
    let text = text.trim();
    if let Some(rest) = text.strip_prefix('%') {
        Value::Temp(rest.to_string())
    } else if let Some(rest) = text.strip_prefix('$') {
        Value::Global(rest.to_string())
    } else if text.contains('.') {
        Value::FloatConst(text.parse().unwrap_or(0.0))
    } else {
        Value::IntConst(text.parse().unwrap_or(0))
    }
}

fn parse_signature(line: &str) -> Result<(String, Option<IrType>, Vec<Param>), String> {
    let rest = line
        .strip_prefix("function ")
        .ok_or_else(|| "expected 'function' keyword".to_string())?;
    let (ret_and_name, params_text) = rest
        .split_once('(')
        .ok_or_else(|| "expected '(' in function signature".to_string())?;
    let params_text = params_text.trim_end_matches(')');
    let mut ret_and_name = ret_and_name.split_whitespace();
    let ret_code = ret_and_name.next().unwrap_or_default();
    let ret_ty = if ret_code == "void" {
        None
    } else {
        Some(IrType::from_code(ret_code).ok_or_else(|| format!("bad return type '{}'", ret_code))?)
    };
    let name = ret_and_name
        .next()
        .ok_or_else(|| "missing function name".to_string())?
        .trim_start_matches('$')
        .to_string();

    let mut params = Vec::new();
    for p in params_text.split(',') {
        let p = p.trim();
        if p.is_empty() {
            continue;
        }
        let mut it = p.split_whitespace();
        let ty_code = it.next().ok_or_else(|| "missing param type".to_string())?;
        let pname = it
            .next()
            .ok_or_else(|| "missing param name".to_string())?
            .trim_start_matches('%')
            .to_string();
        let ty = IrType::from_code(ty_code).ok_or_else(|| format!("bad param type '{}'", ty_code))?;
        params.push(Param { name: pname, ty });
    }
    Ok((name, ret_ty, params))
}

fn parse_terminator(line: &str) -> Option<Result<Terminator, String>> {
    if let Some(target) = line.strip_prefix("jmp @") {
        return Some(Ok(Terminator::Jmp(target.trim().to_string())));
    }
    if let Some(rest) = line.strip_prefix("jnz ") {
        let mut parts = rest.splitn(3, ',');
        let cond = parts.next()?.trim();
        let t1 = parts.next()?.trim().trim_start_matches('@');
        let t2 = parts.next()?.trim().trim_start_matches('@');
        return Some(Ok(Terminator::Jnz {
            cond: parse_value(cond),
            if_true: t1.to_string(),
            if_false: t2.to_string(),
        }));
    }
    if line == "ret" {
        return Some(Ok(Terminator::Ret(None)));
    }
    if let Some(rest) = line.strip_prefix("ret ") {
        let mut parts = rest.splitn(2, ' ');
        let ty_code = parts.next()?;
        let val = parts.next()?;
        let ty = match IrType::from_code(ty_code) {
            Some(t) => t,
            None => return Some(Err(format!("bad return type '{}'", ty_code))),
        };
        return Some(Ok(Terminator::Ret(Some((ty, parse_value(val))))));
    }
    if let Some(rest) = line.strip_prefix("switch ") {
        // switch %v { 1 @a, 2 @b, default @c }
        let (value_text, body) = rest.split_once('{')?;
        let body = body.trim_end_matches('}');
        let mut cases = Vec::new();
        let mut default = None;
        for arm in body.split(',') {
            let arm = arm.trim();
            if arm.is_empty() {
                continue;
            }
            if let Some(target) = arm.strip_prefix("default @") {
                default = Some(target.to_string());
            } else {
                let mut it = arm.split_whitespace();
                let case_val: i64 = it.next()?.parse().ok()?;
                let target = it.next()?.trim_start_matches('@').to_string();
                cases.push((case_val, target));
            }
        }
        let default = match default {
            Some(d) => d,
            None => return Some(Err("switch missing default arm".to_string())),
        };
        return Some(Ok(Terminator::Switch {
            value: parse_value(value_text.trim()),
            cases,
            default,
        }));
    }
    None
}

fn parse_inst(line: &str) -> Result<Inst, String> {
    // `store` has no destination temporary, so it can't go through the
    // `%dst = ...` split every other instruction uses.
    if let Some(rest) = line.strip_prefix("store ") {
        let (ty_code, rest) = rest.split_once(',').ok_or("store missing type")?;
        let (addr, value) = rest.split_once(',').ok_or("store missing address/value")?;
        let ty = IrType::from_code(ty_code.trim()).ok_or("bad store type")?;
        return Ok(Inst::Store {
            ty,
            addr: parse_value(addr.trim()),
            value: parse_value(value.trim()),
        });
    }

    let (dst, rhs) = line
        .split_once('=')
        .ok_or_else(|| format!("expected '%dst = ...' instruction, got '{}'", line))?;
    let dst = dst.trim().trim_start_matches('%').to_string();
    let rhs = rhs.trim();
    let mut tokens = rhs.split_whitespace();
    let op = tokens.next().ok_or("missing opcode")?;
    let rest: String = rhs[op.len()..].trim().to_string();

    match op {
        "load" => {
            let (ty_code, addr) = rest.split_once(',').ok_or("load missing address operand")?;
            let ty = IrType::from_code(ty_code.trim()).ok_or("bad load type")?;
            Ok(Inst::Load {
                dst,
                ty,
                addr: parse_value(addr),
            })
        }
        "addr" => {
            let mut parts = rest.splitn(2, ',');
            let base = parts.next().ok_or("addr missing base")?;
            let offset = parts.next().ok_or("addr missing offset")?;
            Ok(Inst::AddrOf {
                dst,
                base: parse_value(base),
                offset: parse_value(offset),
            })
        }
        "phi" => {
            let ty_end = rest.find(',').unwrap_or(rest.len());
            let ty = IrType::from_code(rest[..ty_end].trim()).ok_or("bad phi type")?;
            let mut incoming = Vec::new();
            for pair in rest[ty_end..].trim_start_matches(',').split(';') {
                let pair = pair.trim();
                if pair.is_empty() {
                    continue;
                }
                let (label, val) = pair.split_once(':').ok_or("phi arm missing ':'")?;
                incoming.push((
                    label.trim().trim_start_matches('@').to_string(),
                    parse_value(val.trim()),
                ));
            }
            Ok(Inst::Phi { dst, ty, incoming })
        }
        "call" | "icall" => {
            let indirect = op == "icall";
            let (ret_part, args_part) = rest.split_once('(').ok_or("call missing arg list")?;
            let args_part = args_part.trim_end_matches(')');
            let mut ret_tokens = ret_part.split_whitespace();
            let ret_ty_code = ret_tokens.next().ok_or("call missing return type")?;
            let ret_ty = if ret_ty_code == "void" {
                None
            } else {
                Some(IrType::from_code(ret_ty_code).ok_or("bad call return type")?)
            };
            let callee = ret_tokens
                .next()
                .ok_or("call missing callee")?
                .trim_start_matches('$')
                .trim_start_matches('%')
                .to_string();
            let mut args = Vec::new();
            for a in args_part.split(',') {
                let a = a.trim();
                if a.is_empty() {
                    continue;
                }
                let mut it = a.split_whitespace();
                let aty = IrType::from_code(it.next().ok_or("bad call arg")?).ok_or("bad call arg type")?;
                let aval = parse_value(it.next().ok_or("bad call arg value")?);
                args.push((aty, aval));
            }
            Ok(Inst::Call {
                dst: Some(dst),
                ret_ty,
                callee,
                args,
                indirect,
            })
        }
        "sitof" | "ftosi" | "sext" | "zext" | "trunc" => {
            let mut parts = rest.splitn(2, ',');
            let tys = parts.next().ok_or("convert missing types")?;
            let src = parts.next().ok_or("convert missing source")?;
            let (from_code, to_code) = tys
                .trim()
                .split_once("->")
                .ok_or("convert expects 'from->to' types")?;
            let from_ty = IrType::from_code(from_code.trim()).ok_or("bad convert source type")?;
            let to_ty = IrType::from_code(to_code.trim()).ok_or("bad convert dest type")?;
            Ok(Inst::Convert {
                dst,
                from_ty,
                to_ty,
                signed: op != "ftosi" || true,
                src: parse_value(src),
            })
        }
        _ => parse_binop_or_cmp(&dst, op, &rest),
    }
}

fn parse_binop_or_cmp(dst: &str, op: &str, rest: &str) -> Result<Inst, String> {
    let (ty_code, operands) = rest.split_once(',').ok_or("missing type/operands")?;
    let ty = IrType::from_code(ty_code.trim()).ok_or("bad instruction type")?;
    let mut operands = operands.splitn(2, ',');
    let lhs = parse_value(operands.next().ok_or("missing lhs")?);
    let rhs = parse_value(operands.next().ok_or("missing rhs")?);

    let bin_op = match op {
        "add" => Some(BinOp::Add),
        "sub" => Some(BinOp::Sub),
        "mul" => Some(BinOp::Mul),
        "div" => Some(BinOp::Div),
        "rem" => Some(BinOp::Rem),
        "udiv" => Some(BinOp::UDiv),
        "urem" => Some(BinOp::URem),
        "shl" => Some(BinOp::Shl),
        "shr" => Some(BinOp::Shr),
        "sar" => Some(BinOp::Sar),
        "and" => Some(BinOp::And),
        "or" => Some(BinOp::Or),
        "xor" => Some(BinOp::Xor),
        "fmadd" => Some(BinOp::Fmadd),
        "fmsub" => Some(BinOp::Fmsub),
        _ => None,
    };
    if let Some(bin_op) = bin_op {
        return Ok(Inst::BinOp {
            dst: dst.to_string(),
            ty,
            op: bin_op,
            lhs,
            rhs,
        });
    }

    let cmp_op = match op {
        "ceq" => CmpOp::Eq,
        "cne" => CmpOp::Ne,
        "clt" => CmpOp::Lt,
        "cle" => CmpOp::Le,
        "cgt" => CmpOp::Gt,
        "cge" => CmpOp::Ge,
        "cult" => CmpOp::ULt,
        "cule" => CmpOp::ULe,
        "cugt" => CmpOp::UGt,
        "cuge" => CmpOp::UGe,
        other => return Err(format!("unknown opcode '{}'", other)),
    };
    Ok(Inst::Cmp {
        dst: dst.to_string(),
        ty,
        op: cmp_op,
        lhs,
        rhs,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    const SIMPLE: &str = "\
function w $add(w %a, w %b)
@entry
  %t0 = add w %a, %b
  ret w %t0
";

    #[test]
    fn parses_a_minimal_function() {
        let module = parse(SIMPLE).expect("should parse");
        assert_eq!(module.functions.len(), 1);
        let f = &module.functions[0];
        assert_eq!(f.name, "add");
        assert_eq!(f.params.len(), 2);
        assert_eq!(f.blocks.len(), 1);
        match &f.blocks[0].terminator {
            Terminator::Ret(Some((IrType::Word, Value::Temp(t)))) => assert_eq!(t, "t0"),
            other => panic!("unexpected terminator {:?}", other),
        }
    }

    #[test]
    fn parses_conditional_branches_and_phi() {
        let text = "\
function w $max(w %a, w %b)
@entry
  %c = cgt w %a, %b
  jnz %c, @then, @else
@then
  jmp @merge
@else
  jmp @merge
@merge
  %r = phi w, then:%a; else:%b
  ret w %r
";
        let module = parse(text).expect("should parse");
        let f = &module.functions[0];
        assert_eq!(f.blocks.len(), 4);
        match &f.blocks[3].insts[0] {
            Inst::Phi { incoming, .. } => assert_eq!(incoming.len(), 2),
            other => panic!("expected phi, got {:?}", other),
        }
    }

    #[test]
    fn parses_data_section_with_string_literal() {
        let text = "data $S = { b \"hi\", b 0 }\n";
        let module = parse(text).expect("should parse");
        assert_eq!(module.data[0].entries.len(), 3);
    }

    #[test]
    fn parses_a_store_instruction_with_no_destination_temporary() {
        let text = "\
function w $f(l %p, w %v)
@entry
  store w, %p, %v
  ret
";
        let module = parse(text).expect("should parse");
        match &module.functions[0].blocks[0].insts[0] {
            Inst::Store { ty: IrType::Word, addr: Value::Temp(a), value: Value::Temp(v) } => {
                assert_eq!(a, "p");
                assert_eq!(v, "v");
            }
            other => panic!("expected store, got {:?}", other),
        }
    }

    #[test]
    fn reports_function_and_line_on_malformed_instruction() {
        let text = "function w $f()\n@entry\n  bogus\n";
        let err = parse(text).unwrap_err();
        assert!(err.context.contains("f") || err.message.len() > 0);
    }
}

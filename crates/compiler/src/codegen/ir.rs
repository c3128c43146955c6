//! In-memory IR builder.
//!
//! Deliberately mirrors the shape `fbasic_backend::ir` parses (spec §6) but
//! stays its own type — codegen only has to get the *text* right, not share
//! a crate-internal representation with the backend driver.

use std::fmt::Write as _;

use super::error::CodeGenError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IrType {
    Byte,
    Half,
    Word,
    Long,
    Single,
    Double,
    /// Opaque pointer-sized handle: strings, arrays, UDTs, classes, lists,
    /// hashmaps, and future handles are all carried as `l` at the IR level.
    Pointer,
}

impl IrType {
    fn code(self) -> &'static str {
        match self {
            IrType::Byte => "b",
            IrType::Half => "h",
            IrType::Word => "w",
            IrType::Long => "l",
            IrType::Single => "s",
            IrType::Double => "d",
            IrType::Pointer => "l",
        }
    }

    pub fn is_float(self) -> bool {
        matches!(self, IrType::Single | IrType::Double)
    }

    /// Relative width, for picking widen vs. truncate on a numeric convert.
    pub fn size_class(self) -> u8 {
        match self {
            IrType::Byte => 1,
            IrType::Half => 2,
            IrType::Word | IrType::Single => 4,
            IrType::Long | IrType::Double | IrType::Pointer => 8,
        }
    }
}

impl std::fmt::Display for IrType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.code())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Temp(String),
    IntConst(i64),
    FloatConst(f64),
    Global(String),
}

impl std::fmt::Display for Value {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Value::Temp(t) => write!(f, "%{}", t),
            Value::IntConst(n) => write!(f, "{}", n),
            // Always carry a decimal point so the backend's own parser
            // (which tells float from int constants by the presence of
            // '.') classifies this correctly on the way back in.
            Value::FloatConst(x) => {
                if x.fract() == 0.0 && x.is_finite() {
                    write!(f, "{:.1}", x)
                } else {
                    write!(f, "{}", x)
                }
            }
            Value::Global(g) => write!(f, "${}", g),
        }
    }
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
    Fmadd,
    Fmsub,
}

impl BinOp {
    fn mnemonic(self) -> &'static str {
        match self {
            BinOp::Add => "add",
            BinOp::Sub => "sub",
            BinOp::Mul => "mul",
            BinOp::Div => "div",
            BinOp::Rem => "rem",
            BinOp::UDiv => "udiv",
            BinOp::URem => "urem",
            BinOp::Shl => "shl",
            BinOp::Shr => "shr",
            BinOp::Sar => "sar",
            BinOp::And => "and",
            BinOp::Or => "or",
            BinOp::Xor => "xor",
            BinOp::Fmadd => "fmadd",
            BinOp::Fmsub => "fmsub",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CmpOp {
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
    ULt,
    ULe,
    UGt,
    UGe,
}

impl CmpOp {
    fn mnemonic(self) -> &'static str {
        match self {
            CmpOp::Eq => "ceq",
            CmpOp::Ne => "cne",
            CmpOp::Lt => "clt",
            CmpOp::Le => "cle",
            CmpOp::Gt => "cgt",
            CmpOp::Ge => "cge",
            CmpOp::ULt => "cult",
            CmpOp::ULe => "cule",
            CmpOp::UGt => "cugt",
            CmpOp::UGe => "cuge",
        }
    }
}

#[derive(Debug, Clone)]
pub enum Inst {
    BinOp { dst: String, ty: IrType, op: BinOp, lhs: Value, rhs: Value },
    Cmp { dst: String, ty: IrType, op: CmpOp, lhs: Value, rhs: Value },
    Convert { dst: String, op: &'static str, from_ty: IrType, to_ty: IrType, src: Value },
    Load { dst: String, ty: IrType, addr: Value },
    Store { ty: IrType, addr: Value, value: Value },
    AddrOf { dst: String, base: Value, offset: Value },
    Call { dst: Option<String>, ret_ty: Option<IrType>, callee: String, args: Vec<(IrType, Value)>, indirect: bool },
    Phi { dst: String, ty: IrType, incoming: Vec<(String, Value)> },
}

impl Inst {
    fn write(&self, out: &mut String) -> std::fmt::Result {
        match self {
            Inst::BinOp { dst, ty, op, lhs, rhs } => {
                writeln!(out, "  %{} = {} {}, {}, {}", dst, op.mnemonic(), ty, lhs, rhs)
            }
            Inst::Cmp { dst, ty, op, lhs, rhs } => {
                writeln!(out, "  %{} = {} {}, {}, {}", dst, op.mnemonic(), ty, lhs, rhs)
            }
            Inst::Convert { dst, op, from_ty, to_ty, src } => {
                writeln!(out, "  %{} = {} {}->{}, {}", dst, op, from_ty, to_ty, src)
            }
            Inst::Load { dst, ty, addr } => writeln!(out, "  %{} = load {}, {}", dst, ty, addr),
            Inst::Store { ty, addr, value } => writeln!(out, "  store {}, {}, {}", ty, addr, value),
            Inst::AddrOf { dst, base, offset } => writeln!(out, "  %{} = addr {}, {}", dst, base, offset),
            Inst::Call { dst, ret_ty, callee, args, indirect } => {
                let op = if *indirect { "icall" } else { "call" };
                let ret = ret_ty.map(|t| t.to_string()).unwrap_or_else(|| "void".to_string());
                let args_text: Vec<String> = args.iter().map(|(ty, v)| format!("{} {}", ty, v)).collect();
                match dst {
                    Some(d) => writeln!(out, "  %{} = {} {} ${}({})", d, op, ret, callee, args_text.join(", ")),
                    None => writeln!(out, "  %_ = {} {} ${}({})", op, ret, callee, args_text.join(", ")),
                }
            }
            Inst::Phi { dst, ty, incoming } => {
                let arms: Vec<String> = incoming.iter().map(|(label, v)| format!("{}:{}", label, v)).collect();
                writeln!(out, "  %{} = phi {}, {}", dst, ty, arms.join("; "))
            }
        }
    }
}

#[derive(Debug, Clone)]
pub enum Terminator {
    Jmp(String),
    Jnz { cond: Value, if_true: String, if_false: String },
    Ret(Option<(IrType, Value)>),
    Switch { value: Value, cases: Vec<(i64, String)>, default: String },
    /// Placeholder for a block still under construction; never emitted —
    /// [`Module::to_text`] treats a surviving `Unset` as an internal error.
    Unset,
}

impl Terminator {
    fn write(&self, out: &mut String) -> Result<(), CodeGenError> {
        match self {
            Terminator::Jmp(l) => {
                writeln!(out, "  jmp @{}", l)?;
            }
            Terminator::Jnz { cond, if_true, if_false } => {
                writeln!(out, "  jnz {}, @{}, @{}", cond, if_true, if_false)?;
            }
            Terminator::Ret(None) => {
                writeln!(out, "  ret")?;
            }
            Terminator::Ret(Some((ty, v))) => {
                writeln!(out, "  ret {} {}", ty, v)?;
            }
            Terminator::Switch { value, cases, default } => {
                let arms: Vec<String> = cases.iter().map(|(v, l)| format!("{} @{}", v, l)).collect();
                let mut all = arms.join(", ");
                if !all.is_empty() {
                    all.push_str(", ");
                }
                writeln!(out, "  switch {} {{ {}default @{} }}", value, all, default)?;
            }
            Terminator::Unset => {
                return Err(CodeGenError::Logic("block emitted with no terminator".to_string()));
            }
        }
        Ok(())
    }
}

#[derive(Debug, Clone)]
pub struct Block {
    pub label: String,
    pub insts: Vec<Inst>,
    pub terminator: Terminator,
}

#[derive(Debug, Clone)]
pub struct Function {
    pub name: String,
    pub ret_ty: Option<IrType>,
    pub params: Vec<(String, IrType)>,
    pub blocks: Vec<Block>,
}

impl Function {
    fn write(&self, out: &mut String) -> Result<(), CodeGenError> {
        let ret = self.ret_ty.map(|t| t.to_string()).unwrap_or_else(|| "void".to_string());
        let params: Vec<String> = self.params.iter().map(|(n, t)| format!("{} %{}", t, n)).collect();
        writeln!(out, "function {} ${}({})", ret, self.name, params.join(", "))?;
        for block in &self.blocks {
            writeln!(out, "@{}", block.label)?;
            for inst in &block.insts {
                inst.write(out)?;
            }
            block.terminator.write(out)?;
        }
        Ok(())
    }
}

#[derive(Debug, Clone)]
pub enum DataValue {
    Int(i64),
    Float(f64),
    Byte(u8),
}

#[derive(Debug, Clone)]
pub struct DataItem {
    pub name: String,
    pub entries: Vec<(IrType, DataValue)>,
}

impl DataItem {
    fn write(&self, out: &mut String) -> Result<(), CodeGenError> {
        let entries: Vec<String> = self
            .entries
            .iter()
            .map(|(ty, v)| match v {
                DataValue::Int(n) => format!("{} {}", ty, n),
                DataValue::Float(x) => format!("{} {}", ty, x),
                DataValue::Byte(b) => format!("{} {}", ty, b),
            })
            .collect();
        writeln!(out, "data ${} = {{ {} }}", self.name, entries.join(", "))?;
        Ok(())
    }

    /// Builds a `{ b '<char>', ..., b 0 }` literal the way a NUL-terminated
    /// BASIC string payload is laid out in the data section.
    pub fn string_literal(name: impl Into<String>, text: &str) -> DataItem {
        let mut entries: Vec<(IrType, DataValue)> = text.bytes().map(|b| (IrType::Byte, DataValue::Byte(b))).collect();
        entries.push((IrType::Byte, DataValue::Byte(0)));
        DataItem { name: name.into(), entries }
    }
}

#[derive(Debug, Clone, Default)]
pub struct Module {
    pub data: Vec<DataItem>,
    pub functions: Vec<Function>,
}

impl Module {
    pub fn to_text(&self) -> Result<String, CodeGenError> {
        let mut out = String::new();
        for item in &self.data {
            item.write(&mut out)?;
        }
        for function in &self.functions {
            function.write(&mut out)?;
        }
        Ok(out)
    }
}

/// Incrementally builds one [`Function`], handing out fresh temporary names
/// and letting lowering code append instructions to "the current block"
/// without threading a block index through every call.
pub struct FunctionBuilder {
    pub name: String,
    pub ret_ty: Option<IrType>,
    pub params: Vec<(String, IrType)>,
    blocks: Vec<Block>,
    current: usize,
    temp_counter: u32,
    label_counter: u32,
}

impl FunctionBuilder {
    pub fn new(name: impl Into<String>, ret_ty: Option<IrType>, params: Vec<(String, IrType)>) -> Self {
        let mut builder = FunctionBuilder {
            name: name.into(),
            ret_ty,
            params,
            blocks: Vec::new(),
            current: 0,
            temp_counter: 0,
            label_counter: 0,
        };
        let entry = builder.fresh_label("entry");
        builder.blocks.push(Block { label: entry, insts: Vec::new(), terminator: Terminator::Unset });
        builder
    }

    pub fn fresh_temp(&mut self) -> String {
        let name = format!("t{}", self.temp_counter);
        self.temp_counter += 1;
        name
    }

    pub fn fresh_label(&mut self, hint: &str) -> String {
        let name = format!("{}{}", hint, self.label_counter);
        self.label_counter += 1;
        name
    }

    /// Starts a new block with the given label and switches the cursor to
    /// it, returning the label for callers that record it for jump targets.
    pub fn start_block(&mut self, label: String) -> String {
        self.blocks.push(Block { label: label.clone(), insts: Vec::new(), terminator: Terminator::Unset });
        self.current = self.blocks.len() - 1;
        label
    }

    pub fn current_label(&self) -> &str {
        &self.blocks[self.current].label
    }

    pub fn push(&mut self, inst: Inst) {
        self.blocks[self.current].insts.push(inst);
    }

    /// Sets the current block's terminator if it hasn't already been set —
    /// a block that already fell off the end via an earlier `RETURN`/`EXIT`
    /// keeps that terminator rather than being overwritten.
    pub fn terminate(&mut self, term: Terminator) {
        if matches!(self.blocks[self.current].terminator, Terminator::Unset) {
            self.blocks[self.current].terminator = term;
        }
    }

    pub fn is_current_terminated(&self) -> bool {
        !matches!(self.blocks[self.current].terminator, Terminator::Unset)
    }

    pub fn emit_binop(&mut self, ty: IrType, op: BinOp, lhs: Value, rhs: Value) -> Value {
        let dst = self.fresh_temp();
        self.push(Inst::BinOp { dst: dst.clone(), ty, op, lhs, rhs });
        Value::Temp(dst)
    }

    pub fn emit_cmp(&mut self, ty: IrType, op: CmpOp, lhs: Value, rhs: Value) -> Value {
        let dst = self.fresh_temp();
        self.push(Inst::Cmp { dst: dst.clone(), ty, op, lhs, rhs });
        Value::Temp(dst)
    }

    pub fn emit_convert(&mut self, op: &'static str, from_ty: IrType, to_ty: IrType, src: Value) -> Value {
        let dst = self.fresh_temp();
        self.push(Inst::Convert { dst: dst.clone(), op, from_ty, to_ty, src });
        Value::Temp(dst)
    }

    pub fn emit_load(&mut self, ty: IrType, addr: Value) -> Value {
        let dst = self.fresh_temp();
        self.push(Inst::Load { dst: dst.clone(), ty, addr });
        Value::Temp(dst)
    }

    pub fn emit_store(&mut self, ty: IrType, addr: Value, value: Value) {
        self.push(Inst::Store { ty, addr, value });
    }

    pub fn emit_addr(&mut self, base: Value, offset: Value) -> Value {
        let dst = self.fresh_temp();
        self.push(Inst::AddrOf { dst: dst.clone(), base, offset });
        Value::Temp(dst)
    }

    pub fn emit_call(&mut self, ret_ty: Option<IrType>, callee: impl Into<String>, args: Vec<(IrType, Value)>) -> Option<Value> {
        let dst = ret_ty.map(|_| self.fresh_temp());
        self.push(Inst::Call { dst: dst.clone(), ret_ty, callee: callee.into(), args, indirect: false });
        dst.map(Value::Temp)
    }

    pub fn finish(self) -> Function {
        Function { name: self.name, ret_ty: self.ret_ty, params: self.params, blocks: self.blocks }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn emits_a_minimal_function_the_backend_grammar_accepts() {
        let mut fb = FunctionBuilder::new("add", Some(IrType::Word), vec![("a".to_string(), IrType::Word), ("b".to_string(), IrType::Word)]);
        let sum = fb.emit_binop(IrType::Word, BinOp::Add, Value::Temp("a".to_string()), Value::Temp("b".to_string()));
        fb.terminate(Terminator::Ret(Some((IrType::Word, sum))));
        let module = Module { data: Vec::new(), functions: vec![fb.finish()] };
        let text = module.to_text().expect("should render");
        assert!(text.starts_with("function w $add(w %a, w %b)"));
        assert!(text.contains("ret w %t0"));
    }

    #[test]
    fn float_constants_always_carry_a_decimal_point() {
        let v = Value::FloatConst(3.0);
        assert_eq!(v.to_string(), "3.0");
    }

    #[test]
    fn string_literal_data_item_nul_terminates() {
        let item = DataItem::string_literal("S0", "hi");
        assert_eq!(item.entries.len(), 3);
        assert!(matches!(item.entries.last(), Some((IrType::Byte, DataValue::Byte(0)))));
    }
}

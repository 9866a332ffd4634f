//! TIR (textual IR) parser.
//!
//! The parser is a hand-written cursor over the source text. Block references
//! (`^name`) may point forward, so they are recorded as pending resolves and
//! patched once the closing `}` of the function has been read.

use crate::core::error::{CompileError, CompileResult};
use crate::ir::{BinOp, BlockId, Instruction, IrFunction, Operand, UnOp, Var};
use std::collections::{BTreeSet, HashMap, HashSet};

/// Parse every function in `text`.
pub fn parse_ir(text: &str) -> CompileResult<Vec<IrFunction>> {
    let parser = Parser::new(text);
    parser.parse()
}

type ParseResult<T> = Result<T, String>;

struct Parser<'a> {
    text: &'a str,
    pos: usize,
    funcs: Vec<IrFunction>,
    func_names: HashSet<&'a str>,

    // Per-function state
    blocks: HashMap<&'a str, BlockId>,
    block_resolves: Vec<Resolve<'a>>,
    explicit_succs: Vec<(BlockId, Resolve<'a>)>,
}

/// Which block-id slot of an instruction a resolve patches.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Slot {
    Jump,
    Then,
    Else,
    Successor,
}

#[derive(Debug)]
struct Resolve<'a> {
    name: &'a str,
    block: BlockId,
    index: usize,
    slot: Slot,
    pos: usize,
}

impl<'a> Parser<'a> {
    fn new(text: &'a str) -> Self {
        Self {
            text,
            pos: 0,
            funcs: Vec::new(),
            func_names: HashSet::new(),
            blocks: HashMap::new(),
            block_resolves: Vec::new(),
            explicit_succs: Vec::new(),
        }
    }

    fn parse(mut self) -> CompileResult<Vec<IrFunction>> {
        self.skip_whitespace(true);

        while !self.is_eof() {
            if let Err(message) = self.parse_function() {
                return Err(CompileError::Parse {
                    line: self.line_at(self.pos),
                    message,
                });
            }
            self.skip_whitespace(true);
        }

        Ok(self.funcs)
    }

    fn line_at(&self, pos: usize) -> usize {
        let end = pos.min(self.text.len());
        self.text[..end].matches('\n').count() + 1
    }

    fn is_eof(&self) -> bool {
        self.pos >= self.text.len()
    }

    fn current_char(&self) -> Option<char> {
        self.text[self.pos..].chars().next()
    }

    fn advance(&mut self) {
        if let Some(ch) = self.current_char() {
            self.pos += ch.len_utf8();
        }
    }

    /// Skip blanks and `;` comments. Comments end before their newline so
    /// that line-sensitive callers still see it.
    fn skip_whitespace(&mut self, skip_newlines: bool) {
        while let Some(ch) = self.current_char() {
            if ch == ';' {
                while let Some(ch) = self.current_char() {
                    if ch == '\n' {
                        break;
                    }
                    self.advance();
                }
            } else if ch.is_whitespace() {
                if ch == '\n' && !skip_newlines {
                    break;
                }
                self.advance();
            } else {
                break;
            }
        }
    }

    fn try_read(&mut self, ch: char) -> bool {
        self.skip_whitespace(false);
        if self.current_char() == Some(ch) {
            self.advance();
            true
        } else {
            false
        }
    }

    fn expect(&mut self, ch: char) -> ParseResult<()> {
        if !self.try_read(ch) {
            return Err(format!(
                "expected '{}' but found {}",
                ch,
                self.describe_current()
            ));
        }
        Ok(())
    }

    fn describe_current(&self) -> String {
        match self.current_char() {
            None => "end of input".to_string(),
            Some('\n') => "end of line".to_string(),
            Some(ch) => format!("'{}'", ch),
        }
    }

    fn at_line_end(&mut self) -> bool {
        self.skip_whitespace(false);
        matches!(self.current_char(), None | Some('\n') | Some('}'))
    }

    fn expect_line_end(&mut self) -> ParseResult<()> {
        if !self.at_line_end() {
            return Err(format!(
                "unexpected {} after instruction",
                self.describe_current()
            ));
        }
        Ok(())
    }

    fn read_identifier(&mut self) -> ParseResult<&'a str> {
        self.skip_whitespace(false);
        let start = self.pos;

        match self.current_char() {
            Some(ch) if ch.is_alphabetic() || ch == '_' => {}
            _ => {
                return Err(format!(
                    "expected identifier but found {}",
                    self.describe_current()
                ))
            }
        }

        while let Some(ch) = self.current_char() {
            if ch.is_alphanumeric() || ch == '_' || ch == '.' {
                self.advance();
            } else {
                break;
            }
        }

        Ok(&self.text[start..self.pos])
    }

    fn read_block_name(&mut self) -> ParseResult<&'a str> {
        self.expect('^')?;
        self.read_identifier()
    }

    fn read_number(&mut self) -> ParseResult<i64> {
        self.skip_whitespace(false);
        let start = self.pos;
        if self.current_char() == Some('-') {
            self.advance();
        }
        while let Some(ch) = self.current_char() {
            if ch.is_ascii_digit() {
                self.advance();
            } else {
                break;
            }
        }
        let digits = &self.text[start..self.pos];
        digits
            .parse()
            .map_err(|_| format!("invalid integer literal '{}'", digits))
    }

    fn read_operand(&mut self) -> ParseResult<Operand> {
        self.skip_whitespace(false);
        match self.current_char() {
            Some(ch) if ch.is_ascii_digit() || ch == '-' => Ok(Operand::Const(self.read_number()?)),
            _ => Ok(Operand::var(self.read_identifier()?)),
        }
    }

    fn read_call_args(&mut self) -> ParseResult<Vec<Operand>> {
        self.expect('(')?;
        let mut args = Vec::new();
        if self.try_read(')') {
            return Ok(args);
        }
        loop {
            args.push(self.read_operand()?);
            if self.try_read(')') {
                return Ok(args);
            }
            self.expect(',')?;
        }
    }

    /// `func name(a, b) [locals N] [entry ^b] { ... }`
    fn parse_function(&mut self) -> ParseResult<()> {
        let keyword = self.read_identifier()?;
        if keyword != "func" {
            return Err(format!("expected 'func' but found '{}'", keyword));
        }

        let name = self.read_identifier()?;
        if !self.func_names.insert(name) {
            return Err(format!("duplicate function '{}'", name));
        }

        self.expect('(')?;
        let mut params = Vec::new();
        if !self.try_read(')') {
            loop {
                params.push(self.read_identifier()?);
                if self.try_read(')') {
                    break;
                }
                self.expect(',')?;
            }
        }

        let mut func = IrFunction::with_params(name, params.iter().copied());
        let mut nlocals = None;
        let mut entry = None;
        loop {
            self.skip_whitespace(false);
            if self.current_char() == Some('{') {
                break;
            }
            match self.read_identifier()? {
                "locals" => {
                    let n = self.read_number()?;
                    nlocals = Some(u32::try_from(n).map_err(|_| format!("invalid local count {}", n))?);
                }
                "entry" => {
                    let pos = self.pos;
                    entry = Some((self.read_block_name()?, pos));
                }
                other => return Err(format!("unknown function attribute '{}'", other)),
            }
        }
        self.expect('{')?;

        self.blocks.clear();
        self.block_resolves.clear();
        self.explicit_succs.clear();

        self.parse_body(&mut func)?;
        self.resolve_all_references(&mut func)?;
        self.wire_successors(&mut func)?;

        if let Some((label, pos)) = entry {
            let id = self.lookup_block(label, pos)?;
            func.set_entry(id).map_err(|e| e.to_string())?;
        }

        let nlocals = match nlocals {
            Some(n) => n,
            None => count_locals(&func),
        };
        func.set_nlocals(nlocals);

        log::trace!(
            "parsed function {} ({} blocks, {} locals)",
            func.name(),
            func.blocks().len(),
            func.nlocals()
        );
        self.funcs.push(func);
        Ok(())
    }

    fn parse_body(&mut self, func: &mut IrFunction) -> ParseResult<()> {
        let mut current: Option<BlockId> = None;

        loop {
            self.skip_whitespace(true);
            if self.is_eof() {
                return Err(format!("unterminated function '{}'", func.name()));
            }
            if self.try_read('}') {
                break;
            }

            let start = self.pos;
            let word = self.read_identifier()?;

            if self.current_char() == Some(':') {
                self.advance();
                if self.blocks.contains_key(word) {
                    self.pos = start;
                    return Err(format!("duplicate block '{}'", word));
                }
                let id = func.new_block(Some(word));
                self.blocks.insert(word, id);
                current = Some(id);
                self.expect_line_end()?;
                continue;
            }

            let block = match current {
                Some(id) => id,
                None => {
                    let id = func.new_block(None);
                    current = Some(id);
                    id
                }
            };

            if word == "succ" {
                let pos = self.pos;
                let name = self.read_block_name()?;
                self.explicit_succs.push((
                    block,
                    Resolve {
                        name,
                        block,
                        index: 0,
                        slot: Slot::Successor,
                        pos,
                    },
                ));
                self.expect_line_end()?;
                continue;
            }

            if func.block(block).is_some_and(|b| b.terminator().is_some()) {
                self.pos = start;
                return Err(format!(
                    "instruction after terminator in block '{}'",
                    func.block(block).map(|b| b.name()).unwrap_or_default()
                ));
            }

            let index = func.block(block).map_or(0, |b| b.len());
            let inst = self.parse_instruction(word, block, index)?;
            self.expect_line_end()?;
            func.push(block, inst).map_err(|e| e.to_string())?;
        }

        if func.blocks().is_empty() {
            return Err(format!("function '{}' has no blocks", func.name()));
        }
        Ok(())
    }

    fn parse_instruction(
        &mut self,
        word: &'a str,
        block: BlockId,
        index: usize,
    ) -> ParseResult<Instruction> {
        match word {
            "br" => {
                self.defer_block(block, index, Slot::Jump)?;
                Ok(Instruction::Jump(0))
            }
            "condbr" => {
                let cond = self.read_operand()?;
                self.expect(',')?;
                self.defer_block(block, index, Slot::Then)?;
                self.expect(',')?;
                self.defer_block(block, index, Slot::Else)?;
                Ok(Instruction::CondJump {
                    cond,
                    then_target: 0,
                    else_target: 0,
                })
            }
            "ret" => {
                if self.at_line_end() {
                    Ok(Instruction::Return(None))
                } else {
                    Ok(Instruction::Return(Some(self.read_operand()?)))
                }
            }
            "label" => Ok(Instruction::Label(self.read_identifier()?.to_string())),
            "call" => {
                let callee = self.read_identifier()?;
                let args = self.read_call_args()?;
                Ok(Instruction::Call {
                    dest: None,
                    func: callee.to_string(),
                    args,
                })
            }
            dest => {
                self.expect('=')?;
                self.parse_definition(Var::new(dest))
            }
        }
    }

    /// Right-hand side of `dest = ...`.
    fn parse_definition(&mut self, dest: Var) -> ParseResult<Instruction> {
        self.skip_whitespace(false);
        if matches!(self.current_char(), Some(ch) if ch.is_ascii_digit() || ch == '-') {
            return Ok(Instruction::Assign {
                dest,
                src: Operand::Const(self.read_number()?),
            });
        }

        let word = self.read_identifier()?;
        // A mnemonic with nothing after it is a plain copy of a variable of that name.
        if self.at_line_end() {
            return Ok(Instruction::Assign {
                dest,
                src: Operand::var(word),
            });
        }

        if word == "call" {
            let callee = self.read_identifier()?;
            let args = self.read_call_args()?;
            return Ok(Instruction::Call {
                dest: Some(dest),
                func: callee.to_string(),
                args,
            });
        }
        if let Some(op) = BinOp::from_mnemonic(word) {
            let lhs = self.read_operand()?;
            self.expect(',')?;
            let rhs = self.read_operand()?;
            return Ok(Instruction::Binary { dest, op, lhs, rhs });
        }
        if let Some(op) = UnOp::from_mnemonic(word) {
            let operand = self.read_operand()?;
            return Ok(Instruction::Unary { dest, op, operand });
        }
        Err(format!("unknown operation '{}'", word))
    }

    fn defer_block(&mut self, block: BlockId, index: usize, slot: Slot) -> ParseResult<()> {
        self.skip_whitespace(false);
        let pos = self.pos;
        let name = self.read_block_name()?;
        self.block_resolves.push(Resolve {
            name,
            block,
            index,
            slot,
            pos,
        });
        Ok(())
    }

    fn lookup_block(&mut self, name: &str, pos: usize) -> ParseResult<BlockId> {
        match self.blocks.get(name) {
            Some(id) => Ok(*id),
            None => {
                self.pos = pos;
                Err(format!("unknown block '^{}'", name))
            }
        }
    }

    fn resolve_all_references(&mut self, func: &mut IrFunction) -> ParseResult<()> {
        let resolves = std::mem::take(&mut self.block_resolves);
        for resolve in &resolves {
            let target = self.lookup_block(resolve.name, resolve.pos)?;
            let inst = func
                .block_mut(resolve.block)
                .and_then(|b| b.instructions_mut().get_mut(resolve.index))
                .ok_or_else(|| format!("dangling reference to '^{}'", resolve.name))?;
            match (inst, resolve.slot) {
                (Instruction::Jump(t), Slot::Jump) => *t = target,
                (Instruction::CondJump { then_target, .. }, Slot::Then) => *then_target = target,
                (Instruction::CondJump { else_target, .. }, Slot::Else) => *else_target = target,
                _ => return Err(format!("reference to '^{}' in a non-branch", resolve.name)),
            }
        }
        Ok(())
    }

    /// Successors come from `succ` lines when a block has any, otherwise
    /// from its terminator, otherwise it falls through to the next block.
    fn wire_successors(&mut self, func: &mut IrFunction) -> ParseResult<()> {
        let succs = std::mem::take(&mut self.explicit_succs);
        let mut explicit: HashMap<BlockId, Vec<BlockId>> = HashMap::new();
        for (block, resolve) in &succs {
            let target = self.lookup_block(resolve.name, resolve.pos)?;
            explicit.entry(*block).or_default().push(target);
        }

        let count = func.blocks().len();
        for id in 0..count {
            let targets = match explicit.remove(&id) {
                Some(targets) => targets,
                None => derived_successors(func, id, count),
            };
            let mut linked = BTreeSet::new();
            for target in targets {
                if linked.insert(target) {
                    func.link(id, target).map_err(|e| e.to_string())?;
                }
            }
        }
        Ok(())
    }
}

fn derived_successors(func: &IrFunction, id: BlockId, count: usize) -> Vec<BlockId> {
    match func.block(id).and_then(|b| b.terminator()) {
        Some(Instruction::Jump(target)) => vec![*target],
        Some(Instruction::CondJump {
            then_target,
            else_target,
            ..
        }) => vec![*then_target, *else_target],
        Some(_) => Vec::new(),
        None if id + 1 < count => vec![id + 1],
        None => Vec::new(),
    }
}

/// Distinct defined names that are not parameters.
fn count_locals(func: &IrFunction) -> u32 {
    let params: HashSet<&str> = func.params().iter().map(String::as_str).collect();
    let locals: BTreeSet<&str> = func
        .blocks()
        .iter()
        .flat_map(|b| b.defined_vars())
        .filter(|name| !params.contains(name))
        .collect();
    locals.len() as u32
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::BlockKind;

    const MAX: &str = r#"
; maximum of two values
func max(a, b) {
entry:
    c = gt a, b
    condbr c, ^then, ^else
then:
    r = a
    br ^merge
else:
    r = b
    br ^merge
merge:
    ret r
}
"#;

    #[test]
    fn test_parse_diamond() {
        let funcs = parse_ir(MAX).unwrap();
        assert_eq!(funcs.len(), 1);
        let func = &funcs[0];
        assert_eq!(func.name(), "max");
        assert_eq!(func.params(), &["a".to_string(), "b".to_string()]);
        assert_eq!(func.blocks().len(), 4);
        assert_eq!(func.nlocals(), 2);

        let entry = func.block(0).unwrap();
        assert_eq!(entry.label(), Some("entry"));
        assert_eq!(entry.kind(), BlockKind::EndsByCondJump);
        assert_eq!(
            entry.terminator(),
            Some(&Instruction::CondJump {
                cond: Operand::var("c"),
                then_target: 1,
                else_target: 2
            })
        );
        assert_eq!(entry.successors(), &[1, 2]);
        assert_eq!(func.block(3).unwrap().predecessors(), &[1, 2]);
    }

    #[test]
    fn test_parse_instruction_forms() {
        let text = r#"
func f(x) locals 4 {
    a = 5
    b = neg a
    c = call g(a, 1)
    call h()
    d = x
    label done
    ret
}
"#;
        let funcs = parse_ir(text).unwrap();
        let block = funcs[0].block(0).unwrap();
        assert_eq!(block.label(), None);
        let rendered: Vec<_> = block.instructions().iter().map(|i| i.to_string()).collect();
        assert_eq!(
            rendered,
            vec![
                "a = 5",
                "b = neg a",
                "c = call g(a, 1)",
                "call h()",
                "d = x",
                "label done",
                "ret"
            ]
        );
        assert_eq!(funcs[0].nlocals(), 4);
    }

    #[test]
    fn test_fallthrough_and_explicit_successors() {
        let text = r#"
func f() {
a:
    x = 1
b:
    condbr x, ^c, ^a
    succ ^a
c:
    ret x
}
"#;
        let funcs = parse_ir(text).unwrap();
        let func = &funcs[0];
        assert_eq!(func.block(0).unwrap().successors(), &[1]);
        // the explicit list replaces the branch targets
        assert_eq!(func.block(1).unwrap().successors(), &[0]);
        assert!(func.block(2).unwrap().successors().is_empty());
    }

    #[test]
    fn test_entry_attribute() {
        let text = "func f() entry ^start {\nexit:\n    ret\nstart:\n    br ^exit\n}\n";
        let funcs = parse_ir(text).unwrap();
        assert_eq!(funcs[0].entry(), 1);
    }

    #[test]
    fn test_multiple_functions() {
        let text = "func a() {\n    ret\n}\nfunc b() {\n    ret 0\n}\n";
        let funcs = parse_ir(text).unwrap();
        let names: Vec<_> = funcs.iter().map(|f| f.name()).collect();
        assert_eq!(names, vec!["a", "b"]);
    }

    #[test]
    fn test_errors_carry_line_numbers() {
        let err = parse_ir("func f() {\nentry:\n    br ^nowhere\n}\n").unwrap_err();
        assert!(matches!(err, CompileError::Parse { line: 3, ref message } if message.contains("nowhere")));

        let err = parse_ir("func f() {\n    x = frob a\n}\n").unwrap_err();
        assert!(matches!(err, CompileError::Parse { line: 2, .. }));

        let err = parse_ir("func f() {\nentry:\n    ret\n    x = 1\n}\n").unwrap_err();
        assert!(matches!(err, CompileError::Parse { line: 4, ref message } if message.contains("after terminator")));

        let err = parse_ir("func f() {\n    ret\n").unwrap_err();
        assert!(matches!(err, CompileError::Parse { .. }));

        let err = parse_ir("func f() {\n    ret\n}\nfunc f() {\n    ret\n}\n").unwrap_err();
        assert!(matches!(err, CompileError::Parse { line: 4, .. }));
    }
}

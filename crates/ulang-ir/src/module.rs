//! IR module - the namespace functions and globals live in

use crate::instruction::Instruction;
use crate::types::Signature;
use std::fmt;

/// Name of the formatted-output import
pub const PRINTF: &str = "printf";
/// Name of the formatted-input import
pub const SCANF: &str = "scanf";
/// `"%lld\n"`, the template every `print` uses
pub const NUMBER_FMT: &str = "number_fmt";
/// `"%lld"`, the template for reading one integer
pub const INPUT_FMT: &str = "input_fmt";

/// Index of a function inside its [`Module`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct FuncId(pub usize);

/// Index of a block inside its [`Function`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct BlockId(pub usize);

/// What a module-level name refers to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Symbol {
    Function(FuncId),
    Global(usize),
}

/// Internal constant byte array
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Global {
    pub name: String,
    /// Contents including the trailing NUL
    pub bytes: Vec<u8>,
}

impl Global {
    /// NUL-terminated string constant
    pub fn c_string(name: impl Into<String>, text: &str) -> Self {
        let mut bytes = text.as_bytes().to_vec();
        bytes.push(0);
        Self {
            name: name.into(),
            bytes,
        }
    }

    /// Contents up to (not including) the first NUL
    pub fn as_str(&self) -> &str {
        let end = self.bytes.iter().position(|&b| b == 0).unwrap_or(self.bytes.len());
        std::str::from_utf8(&self.bytes[..end]).unwrap_or("")
    }
}

#[derive(Debug)]
pub struct Module {
    pub name: String,
    pub globals: Vec<Global>,
    /// Declaration order is preserved
    pub functions: Vec<Function>,
}

impl Module {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            globals: Vec::new(),
            functions: Vec::new(),
        }
    }

    /// A module pre-populated with the runtime imports and their format strings
    pub fn with_runtime(name: impl Into<String>) -> Self {
        let mut module = Self::new(name);
        module.add_global(Global::c_string(NUMBER_FMT, "%lld\n"));
        module.add_global(Global::c_string(INPUT_FMT, "%lld"));
        module.declare_import(PRINTF, Signature::format_variadic());
        module.declare_import(SCANF, Signature::format_variadic());
        module
    }

    pub fn add_global(&mut self, global: Global) -> usize {
        self.globals.push(global);
        self.globals.len() - 1
    }

    /// Declares a source-level function with integer parameters
    pub fn declare_function(&mut self, name: impl Into<String>, params: Vec<String>) -> FuncId {
        let signature = Signature::integers(params.len());
        self.functions.push(Function::new(name, params, signature, false));
        FuncId(self.functions.len() - 1)
    }

    /// Declares an external symbol provided by the C runtime
    pub fn declare_import(&mut self, name: impl Into<String>, signature: Signature) -> FuncId {
        let params = (0..signature.arity()).map(|i| format!("p{}", i)).collect();
        self.functions.push(Function::new(name, params, signature, true));
        FuncId(self.functions.len() - 1)
    }

    /// Resolves a module-level name
    pub fn lookup(&self, name: &str) -> Option<Symbol> {
        if let Some(idx) = self.functions.iter().position(|f| f.name == name) {
            return Some(Symbol::Function(FuncId(idx)));
        }
        self.globals
            .iter()
            .position(|g| g.name == name)
            .map(Symbol::Global)
    }

    pub fn function(&self, id: FuncId) -> &Function {
        &self.functions[id.0]
    }

    pub fn function_mut(&mut self, id: FuncId) -> &mut Function {
        &mut self.functions[id.0]
    }

    pub fn get_function(&self, name: &str) -> Option<&Function> {
        self.functions.iter().find(|f| f.name == name)
    }

    pub fn get_global(&self, name: &str) -> Option<&Global> {
        self.globals.iter().find(|g| g.name == name)
    }

    /// Functions that have a body
    pub fn definitions(&self) -> impl Iterator<Item = &Function> {
        self.functions.iter().filter(|f| f.has_body())
    }
}

impl fmt::Display for Module {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "; Module: {}", self.name)?;
        writeln!(f)?;

        for global in &self.globals {
            writeln!(
                f,
                "@{} = constant \"{}\"",
                global.name,
                global.as_str().escape_default()
            )?;
        }

        for func in self.functions.iter().filter(|f| !f.has_body()) {
            writeln!(f, "declare {}", func.header())?;
        }

        for func in self.definitions() {
            writeln!(f)?;
            write!(f, "{}", func)?;
        }

        Ok(())
    }
}

#[derive(Debug)]
pub struct Function {
    pub name: String,
    /// Source names of the parameters; `Value::Param(i)` is `params[i]`
    pub params: Vec<String>,
    pub signature: Signature,
    /// Provided by the runtime rather than by source
    pub import: bool,
    /// Empty for declarations
    pub blocks: Vec<BasicBlock>,
    next_temp: u32,
    next_label: u32,
}

impl Function {
    pub fn new(
        name: impl Into<String>,
        params: Vec<String>,
        signature: Signature,
        import: bool,
    ) -> Self {
        Self {
            name: name.into(),
            params,
            signature,
            import,
            blocks: Vec::new(),
            next_temp: 0,
            next_label: 0,
        }
    }

    pub fn has_body(&self) -> bool {
        !self.blocks.is_empty()
    }

    pub fn arity(&self) -> usize {
        self.signature.arity()
    }

    pub fn new_temp(&mut self) -> u32 {
        let id = self.next_temp;
        self.next_temp += 1;
        id
    }

    /// `prefix` itself for the first block of that name, `prefix_N` afterwards
    pub fn fresh_label(&mut self, prefix: &str) -> String {
        if self.block_id(prefix).is_none() {
            return prefix.to_string();
        }
        loop {
            self.next_label += 1;
            let label = format!("{}_{}", prefix, self.next_label);
            if self.block_id(&label).is_none() {
                return label;
            }
        }
    }

    pub fn block(&self, id: BlockId) -> &BasicBlock {
        &self.blocks[id.0]
    }

    pub fn block_mut(&mut self, id: BlockId) -> &mut BasicBlock {
        &mut self.blocks[id.0]
    }

    pub fn block_id(&self, label: &str) -> Option<BlockId> {
        self.blocks.iter().position(|b| b.label == label).map(BlockId)
    }

    pub fn get_block(&self, label: &str) -> Option<&BasicBlock> {
        self.blocks.iter().find(|b| b.label == label)
    }

    /// Labels of the blocks whose terminator can jump to `label`, one entry
    /// per distinct predecessor
    pub fn predecessors(&self, label: &str) -> Vec<&str> {
        self.blocks
            .iter()
            .filter(|b| b.successors().contains(&label))
            .map(|b| b.label.as_str())
            .collect()
    }

    /// Blocks reachable from the entry block, each listed after all of its
    /// dominators
    pub fn reverse_postorder(&self) -> Vec<BlockId> {
        let mut order = Vec::with_capacity(self.blocks.len());
        if self.blocks.is_empty() {
            return order;
        }
        let mut visited = vec![false; self.blocks.len()];
        visited[0] = true;
        // (block, index of the next successor to visit)
        let mut stack = vec![(BlockId(0), 0usize)];
        while let Some((block, next)) = stack.pop() {
            match self.block(block).successors().get(next) {
                Some(label) => {
                    stack.push((block, next + 1));
                    if let Some(succ) = self.block_id(label) {
                        if !visited[succ.0] {
                            visited[succ.0] = true;
                            stack.push((succ, 0));
                        }
                    }
                }
                None => order.push(block),
            }
        }
        order.reverse();
        order
    }

    /// `i64 @name(i64 %a, i64 %b)`
    pub fn header(&self) -> String {
        let mut params: Vec<String> = self
            .signature
            .params
            .iter()
            .zip(&self.params)
            .map(|(ty, name)| {
                if self.import {
                    ty.to_string()
                } else {
                    format!("{} %{}", ty, name)
                }
            })
            .collect();
        if self.signature.variadic {
            params.push("...".to_string());
        }
        format!("i64 @{}({})", self.name, params.join(", "))
    }
}

impl fmt::Display for Function {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "define {} {{", self.header())?;
        for block in &self.blocks {
            writeln!(f, "{}:", block.label)?;
            for inst in &block.instructions {
                writeln!(f, "  {}", inst)?;
            }
        }
        writeln!(f, "}}")
    }
}

/// Straight-line instructions ending in one terminator
#[derive(Debug, Clone)]
pub struct BasicBlock {
    pub label: String,
    pub instructions: Vec<Instruction>,
}

impl BasicBlock {
    pub fn new(label: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            instructions: Vec::new(),
        }
    }

    pub fn is_terminated(&self) -> bool {
        self.terminator().is_some()
    }

    pub fn terminator(&self) -> Option<&Instruction> {
        self.instructions.last().filter(|i| i.is_terminator())
    }

    pub fn successors(&self) -> Vec<&str> {
        self.terminator().map(|t| t.successors()).unwrap_or_default()
    }

    pub fn phis(&self) -> impl Iterator<Item = &Instruction> {
        self.instructions.iter().take_while(|i| i.is_phi())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::instruction::Value;

    #[test]
    fn test_runtime_namespace() {
        let module = Module::with_runtime("test");
        assert!(matches!(module.lookup(PRINTF), Some(Symbol::Function(_))));
        assert!(matches!(module.lookup(SCANF), Some(Symbol::Function(_))));
        assert!(matches!(module.lookup(NUMBER_FMT), Some(Symbol::Global(_))));
        assert_eq!(module.lookup("main"), None);
        assert_eq!(module.get_global(NUMBER_FMT).unwrap().bytes, b"%lld\n\0");
        assert_eq!(module.get_global(INPUT_FMT).unwrap().as_str(), "%lld");
        assert!(module.get_function(PRINTF).unwrap().import);
    }

    #[test]
    fn test_fresh_labels_are_unique() {
        let mut func = Function::new("f", vec![], Signature::integers(0), false);
        let a = func.fresh_label("loop");
        func.blocks.push(BasicBlock::new(a.clone()));
        let b = func.fresh_label("loop");
        func.blocks.push(BasicBlock::new(b.clone()));
        let c = func.fresh_label("loop");
        assert_eq!(a, "loop");
        assert_eq!(b, "loop_1");
        assert_eq!(c, "loop_2");
    }

    #[test]
    fn test_predecessors() {
        let mut func = Function::new("f", vec![], Signature::integers(0), false);
        let mut entry = BasicBlock::new("entry");
        entry.instructions.push(Instruction::CondBranch {
            cond: Value::Const(1),
            then_label: "a".into(),
            else_label: "b".into(),
        });
        let mut a = BasicBlock::new("a");
        a.instructions.push(Instruction::Branch { target: "b".into() });
        func.blocks.extend([entry, a, BasicBlock::new("b")]);

        assert_eq!(func.predecessors("b"), vec!["entry", "a"]);
        assert_eq!(func.predecessors("a"), vec!["entry"]);
        assert!(func.predecessors("entry").is_empty());
    }

    #[test]
    fn test_reverse_postorder() {
        let mut func = Function::new("f", vec![], Signature::integers(0), false);
        let branch = |target: &str| Instruction::Branch {
            target: target.into(),
        };
        let mut entry = BasicBlock::new("entry");
        entry.instructions.push(Instruction::CondBranch {
            cond: Value::Const(1),
            then_label: "loop".into(),
            else_label: "exit".into(),
        });
        // listed before the loop body it follows
        let mut exit = BasicBlock::new("exit");
        exit.instructions.push(Instruction::Return(Value::Const(0)));
        let mut body = BasicBlock::new("loop");
        body.instructions.push(branch("tail"));
        let mut tail = BasicBlock::new("tail");
        tail.instructions.push(Instruction::CondBranch {
            cond: Value::Const(0),
            then_label: "loop".into(),
            else_label: "exit".into(),
        });
        let mut dead = BasicBlock::new("dead");
        dead.instructions.push(branch("exit"));
        func.blocks.extend([entry, exit, body, tail, dead]);

        let order: Vec<&str> = func
            .reverse_postorder()
            .into_iter()
            .map(|id| func.block(id).label.as_str())
            .collect();
        assert_eq!(order, vec!["entry", "loop", "tail", "exit"]);
    }

    #[test]
    fn test_headers() {
        let mut module = Module::with_runtime("test");
        let id = module.declare_function("add", vec!["a".into(), "b".into()]);
        assert_eq!(module.function(id).header(), "i64 @add(i64 %a, i64 %b)");
        assert_eq!(
            module.get_function(PRINTF).unwrap().header(),
            "i64 @printf(ptr, ...)"
        );
    }
}

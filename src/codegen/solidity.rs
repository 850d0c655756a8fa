//! The Solidity-like dialect, with infix operators and named storage.

use std::{collections::HashSet, rc::Rc};

use itertools::Itertools;

use crate::{
    codegen::{
        call,
        infix,
        literal,
        precedence,
        prefix,
        Associativity,
        BodyWriter,
        BranchTokens,
        Dialect,
        Fragment,
        INDENT,
    },
    decompiler::result::{AccessorTarget, Decompilation, Event},
    inference::{field_name, StorageTables},
    signatures::Selector,
    vm::{
        inst::{Inst, Payload},
        value::{eval::eval, known::KnownWord, CopySource, Expr, SharedExpr},
    },
};

/// Renders `decompilation` as a Solidity-like contract.
#[must_use]
pub fn render(decompilation: &Decompilation) -> String {
    let dialect = Solidity::new(decompilation.storage(), decompilation);
    let mut lines = vec![];

    if let Some(metadata) = decompilation.metadata() {
        let version = metadata.compiler_version.as_deref().unwrap_or("unknown");
        lines.push(format!("// Compiled with solc {version}"));
        if let (Some(protocol), Some(hash)) = (metadata.protocol, &metadata.hash) {
            lines.push(format!("// Metadata: {protocol}://{hash}"));
        }
    }
    lines.push("contract Decompiled {".to_string());

    let mut sections = vec![
        events(decompilation),
        structs(decompilation.storage()),
        declarations(decompilation),
    ];
    for function in decompilation.functions() {
        let mut attributes = vec!["external"];
        if function.payable {
            attributes.push("payable");
        } else if function.view {
            attributes.push("view");
        }
        let parameters = function
            .parameters
            .iter()
            .enumerate()
            .map(|(i, typ)| format!("{typ} arg{i}"))
            .join(", ");

        let mut section = vec![format!(
            "{INDENT}function {}({parameters}) {} {{",
            function.name(),
            attributes.join(" ")
        )];
        section.extend(BodyWriter::new(decompilation.exploration(), function.entry, &dialect).write(2));
        section.push(format!("{INDENT}}}"));
        sections.push(section);
    }
    if decompilation.has_fallback() {
        let mut section = vec![format!("{INDENT}fallback() external payable {{")];
        let dispatcher = decompilation.exploration().dispatcher;
        section.extend(BodyWriter::new(decompilation.exploration(), dispatcher, &dialect).write(2));
        section.push(format!("{INDENT}}}"));
        sections.push(section);
    }

    let body = sections
        .into_iter()
        .filter(|section| !section.is_empty())
        .map(|section| section.join("\n"))
        .join("\n\n");
    if !body.is_empty() {
        lines.push(body);
    }
    lines.push("}".to_string());

    let mut text = lines.join("\n");
    text.push('\n');
    text
}

/// Renders `expr` in the Solidity-like dialect, naming storage from `storage`.
#[must_use]
pub fn expr(expr: &SharedExpr, storage: &StorageTables) -> String {
    Solidity {
        storage,
        decompilation: None,
    }
    .fragment(expr)
    .text
}

fn events(decompilation: &Decompilation) -> Vec<String> {
    decompilation
        .events()
        .values()
        .map(|event| {
            format!(
                "{INDENT}event {}({});",
                event.name(),
                event.parameters().join(", ")
            )
        })
        .collect()
}

fn structs(storage: &StorageTables) -> Vec<String> {
    let mut lines = vec![];
    for (slot, mapping) in storage.mappings() {
        if !mapping.has_struct_values() {
            continue;
        }
        lines.push(format!("{INDENT}struct {} {{", storage.struct_name(*slot)));
        for (offset, typ) in storage.struct_fields(*slot) {
            lines.push(format!("{INDENT}{INDENT}{typ} {};", field_name(offset)));
        }
        lines.push(format!("{INDENT}}}"));
    }
    lines
}

fn declarations(decompilation: &Decompilation) -> Vec<String> {
    let storage = decompilation.storage();
    let public: HashSet<AccessorTarget> =
        decompilation.accessors().iter().map(|a| a.target).collect();
    let visibility = |target| if public.contains(&target) { " public" } else { "" };

    let variables = storage
        .variables()
        .keys()
        .filter(|slot| !storage.is_array_length(**slot))
        .map(|slot| {
            format!(
                "{INDENT}{}{} {};",
                storage.variable_type(*slot),
                visibility(AccessorTarget::Variable(*slot)),
                storage.variable_name(*slot)
            )
        });
    let mappings = storage.mappings().keys().map(|slot| {
        format!(
            "{INDENT}{}{} {};",
            storage.mapping_type(*slot),
            visibility(AccessorTarget::Mapping(*slot)),
            storage.mapping_name(*slot)
        )
    });
    let arrays = storage.arrays().keys().map(|slot| {
        format!(
            "{INDENT}{}{} {};",
            storage.array_type(*slot),
            visibility(AccessorTarget::Array(*slot)),
            storage.array_name(*slot)
        )
    });

    variables.chain(mappings).chain(arrays).collect()
}

/// The Solidity-like spelling of expressions and statements.
struct Solidity<'a> {
    storage:       &'a StorageTables,
    decompilation: Option<&'a Decompilation>,
}

impl<'a> Solidity<'a> {
    fn new(storage: &'a StorageTables, decompilation: &'a Decompilation) -> Self {
        Self {
            storage,
            decompilation: Some(decompilation),
        }
    }

    fn text(&self, expr: &SharedExpr) -> String {
        self.fragment(expr).text
    }

    fn binary(
        &self,
        left: &SharedExpr,
        op: &str,
        right: &SharedExpr,
        precedence: u8,
        associativity: Associativity,
    ) -> Fragment {
        infix(
            &self.fragment(left),
            op,
            &self.fragment(right),
            precedence,
            associativity,
        )
    }

    fn comparison(&self, left: &SharedExpr, op: &str, right: &SharedExpr, signed: bool) -> Fragment {
        if signed {
            let left = call("int256", [self.text(left)]);
            let right = call("int256", [self.text(right)]);
            infix(&left, op, &right, precedence::RELATIONAL, Associativity::Left)
        } else {
            self.binary(left, op, right, precedence::RELATIONAL, Associativity::Left)
        }
    }

    fn member(&self, base: &SharedExpr, member: &str) -> Fragment {
        Fragment::atom(format!(
            "{}.{member}",
            self.fragment(base).operand(precedence::ATOM)
        ))
    }

    fn range(&self, offset: &SharedExpr, size: &SharedExpr) -> String {
        let end = eval(&Rc::new(Expr::Add {
            left:  offset.clone(),
            right: size.clone(),
        }));
        format!("memory[{}:{}]", self.text(offset), self.text(&end))
    }

    fn mapping(&self, slot: KnownWord, keys: &[SharedExpr], offset: KnownWord) -> String {
        let mut text = self.storage.mapping_name(slot);
        for key in keys {
            text.push_str(&format!("[{}]", self.text(key)));
        }
        if !offset.is_zero_value() {
            text.push_str(&format!(".{}", field_name(offset)));
        }
        text
    }

    fn variable(&self, slot: &SharedExpr, variable: Option<KnownWord>) -> String {
        match variable {
            Some(key) if self.storage.is_array_length(key) => {
                format!("{}.length", self.storage.array_name(key))
            }
            Some(key) => self.storage.variable_name(key),
            None => format!("storage[{}]", self.text(slot)),
        }
    }

    fn payload(&self, payload: &Payload) -> Vec<String> {
        match &payload.words {
            Some(words) => words.iter().map(|w| self.text(w)).collect(),
            None => vec![self.range(&payload.offset, &payload.size)],
        }
    }

    fn fragment(&self, expr: &SharedExpr) -> Fragment {
        if let Some(index) = expr.argument_index() {
            return Fragment::atom(format!("arg{index}"));
        }

        match expr.as_ref() {
            Expr::Val(value) => Fragment::atom(literal(*value)),
            Expr::Add { left, right } => {
                self.binary(left, "+", right, precedence::ADDITIVE, Associativity::Full)
            }
            Expr::Sub { left, right } => {
                self.binary(left, "-", right, precedence::ADDITIVE, Associativity::Left)
            }
            Expr::Mul { left, right } => self.binary(
                left,
                "*",
                right,
                precedence::MULTIPLICATIVE,
                Associativity::Full,
            ),
            Expr::Div { left, right } => self.binary(
                left,
                "/",
                right,
                precedence::MULTIPLICATIVE,
                Associativity::Left,
            ),
            Expr::Mod { left, right } => self.binary(
                left,
                "%",
                right,
                precedence::MULTIPLICATIVE,
                Associativity::Left,
            ),
            Expr::SDiv { left, right } => call("sdiv", [self.text(left), self.text(right)]),
            Expr::SMod { left, right } => call("smod", [self.text(left), self.text(right)]),
            Expr::AddMod {
                left,
                right,
                modulus,
            } => call("addmod", [left, right, modulus].map(|e| self.text(e))),
            Expr::MulMod {
                left,
                right,
                modulus,
            } => call("mulmod", [left, right, modulus].map(|e| self.text(e))),
            Expr::Exp { base, exponent } => self.binary(
                base,
                "**",
                exponent,
                precedence::EXPONENT,
                Associativity::Right,
            ),
            Expr::SignExtend { size, value } => {
                call("signextend", [self.text(size), self.text(value)])
            }
            Expr::Lt {
                left,
                right,
                equal,
                signed,
            } => self.comparison(left, if *equal { "<=" } else { "<" }, right, *signed),
            Expr::Gt {
                left,
                right,
                equal,
                signed,
            } => self.comparison(left, if *equal { ">=" } else { ">" }, right, *signed),
            Expr::Eq { left, right, equal } => self.binary(
                left,
                if *equal { "==" } else { "!=" },
                right,
                precedence::EQUALITY,
                Associativity::Left,
            ),
            Expr::IsZero(value) if value.is_boolean() => prefix("!", &self.fragment(value)),
            Expr::IsZero(value) => infix(
                &self.fragment(value),
                "==",
                &Fragment::atom("0"),
                precedence::EQUALITY,
                Associativity::Left,
            ),
            Expr::And { left, right } => {
                self.binary(left, "&", right, precedence::BIT_AND, Associativity::Full)
            }
            Expr::Or { left, right } => {
                self.binary(left, "|", right, precedence::BIT_OR, Associativity::Full)
            }
            Expr::Xor { left, right } => {
                self.binary(left, "^", right, precedence::BIT_XOR, Associativity::Full)
            }
            Expr::Not(value) => prefix("~", &self.fragment(value)),
            Expr::Byte { position, value } => {
                call("byte", [self.text(position), self.text(value)])
            }
            Expr::Shl { value, shift } => {
                self.binary(value, "<<", shift, precedence::SHIFT, Associativity::Left)
            }
            Expr::Shr { value, shift } => {
                self.binary(value, ">>", shift, precedence::SHIFT, Associativity::Left)
            }
            Expr::Sar { value, shift } => call("sar", [self.text(value), self.text(shift)]),
            Expr::Sig(selector) => Fragment::new(format!("msg.sig == {selector}"), precedence::EQUALITY),
            Expr::Prop(property) => Fragment::atom(property.name()),
            Expr::Balance(address) => self.member(address, "balance"),
            Expr::ExtCodeSize(address) => self.member(address, "code.length"),
            Expr::ExtCodeHash(address) => self.member(address, "codehash"),
            Expr::BlockHash(number) => call("blockhash", [self.text(number)]),
            Expr::BlobHash(index) => call("blobhash", [self.text(index)]),
            Expr::CallValue => Fragment::atom("msg.value"),
            Expr::CallDataLoad(offset) => Fragment::atom(format!("calldata[{}]", self.text(offset))),
            Expr::CallDataSize => Fragment::atom("msg.data.length"),
            Expr::MLoad(offset) => Fragment::atom(format!("memory[{}]", self.text(offset))),
            Expr::Sha3 {
                words: Some(words), ..
            } => call("keccak256", words.iter().map(|w| self.text(w))),
            Expr::Sha3 { offset, size, .. } => call("keccak256", [self.range(offset, size)]),
            Expr::SLoad { slot, variable } => Fragment::atom(self.variable(slot, *variable)),
            Expr::MappingLoad { slot, keys, offset } => {
                Fragment::atom(self.mapping(*slot, keys, *offset))
            }
            Expr::ArrayLoad { slot, index } => Fragment::atom(format!(
                "{}[{}]",
                self.storage.array_name(*slot),
                self.text(index)
            )),
            Expr::TLoad(slot) => Fragment::atom(format!("transient[{}]", self.text(slot))),
            Expr::Call {
                kind,
                gas,
                address,
                value,
                arg_offset,
                arg_size,
                ..
            } => {
                let mut options = vec![format!("gas: {}", self.text(gas))];
                if let Some(value) = value {
                    options.push(format!("value: {}", self.text(value)));
                }
                Fragment::atom(format!(
                    "{}.{}{{{}}}({})",
                    self.fragment(address).operand(precedence::ATOM),
                    kind.yul_name(),
                    options.join(", "),
                    self.range(arg_offset, arg_size)
                ))
            }
            Expr::Create {
                value,
                offset,
                size,
                salt,
            } => {
                let mut arguments = vec![self.text(value), self.range(offset, size)];
                match salt {
                    Some(salt) => {
                        arguments.push(self.text(salt));
                        call("create2", arguments)
                    }
                    None => call("create", arguments),
                }
            }
            Expr::Copy { source, offset } => match source {
                CopySource::Code => Fragment::atom(format!("code[{}]", self.text(offset))),
                CopySource::ExtCode(address) => Fragment::atom(format!(
                    "{}.code[{}]",
                    self.fragment(address).operand(precedence::ATOM),
                    self.text(offset)
                )),
                CopySource::ReturnData => {
                    Fragment::atom(format!("returndata[{}]", self.text(offset)))
                }
            },
            Expr::Phi { left, right } => call("phi", [self.text(left), self.text(right)]),
        }
    }

    fn event_name(&self, hash: KnownWord) -> String {
        self.decompilation
            .and_then(|d| d.events().get(&hash))
            .map_or_else(|| Event::synthetic_name(hash), Event::name)
    }
}

impl Dialect for Solidity<'_> {
    fn statement(&self, inst: &Inst) -> Option<String> {
        let text = match inst {
            Inst::MStore {
                offset,
                data,
                byte: false,
            } => format!("memory[{}] = {};", self.text(offset), self.text(data)),
            Inst::MStore { offset, data, .. } => {
                format!("mstore8({}, {});", self.text(offset), self.text(data))
            }
            Inst::SStore {
                slot,
                variable,
                data,
            } => format!("{} = {};", self.variable(slot, *variable), self.text(data)),
            Inst::MappingStore {
                slot,
                keys,
                offset,
                data,
            } => format!("{} = {};", self.mapping(*slot, keys, *offset), self.text(data)),
            Inst::ArrayStore { slot, index, data } => format!(
                "{}[{}] = {};",
                self.storage.array_name(*slot),
                self.text(index),
                self.text(data)
            ),
            Inst::TStore { slot, data } => {
                format!("transient[{}] = {};", self.text(slot), self.text(data))
            }
            Inst::Log {
                event: Some(hash),
                topics,
                data,
            } => {
                let mut arguments: Vec<String> =
                    topics.iter().skip(1).map(|t| self.text(t)).collect();
                arguments.extend(self.payload(data));
                format!("emit {}({});", self.event_name(*hash), arguments.join(", "))
            }
            Inst::Log { topics, data, .. } => {
                let mut arguments = vec![self.range(&data.offset, &data.size)];
                arguments.extend(topics.iter().map(|t| self.text(t)));
                format!("log{}({});", topics.len(), arguments.join(", "))
            }
            Inst::Effect(expr) => format!("{};", self.text(expr)),
            Inst::Stop => "return;".to_string(),
            Inst::Return(payload) => match self.payload(payload).as_slice() {
                [] => "return;".to_string(),
                [word] => format!("return {word};"),
                words => format!("return ({});", words.join(", ")),
            },
            Inst::Revert(payload) if payload.size.is_val(0usize) => "revert();".to_string(),
            Inst::Revert(payload) => format!("revert({});", self.payload(payload).join(", ")),
            Inst::SelfDestruct(address) => format!("selfdestruct({});", self.text(address)),
            Inst::Invalid { reason } => format!("invalid(); // {reason}"),
            Inst::Jump { .. } | Inst::JumpI { .. } | Inst::JumpDest { .. } | Inst::SigCase { .. } => {
                return None
            }
        };

        Some(text)
    }

    fn branch(&self, condition: &SharedExpr) -> BranchTokens {
        BranchTokens {
            open:   vec![format!("if ({}) {{", self.text(condition))],
            middle: vec!["} else {".to_string()],
            close:  vec!["}".to_string()],
        }
    }

    fn dispatch(&self, _: Selector) -> Option<String> {
        None
    }

    fn label(&self, label: &str) -> String {
        format!("{label}:")
    }

    fn reference(&self, label: &str) -> String {
        format!("goto {label};")
    }
}

#[cfg(test)]
mod test {
    use std::rc::Rc;

    use crate::{
        codegen::solidity::expr,
        inference::StorageTables,
        signatures::Selector,
        vm::value::{known::KnownWord, Expr, Property, SharedExpr},
    };

    fn caller() -> SharedExpr {
        Rc::new(Expr::Prop(Property::Caller))
    }

    fn add(left: SharedExpr, right: SharedExpr) -> SharedExpr {
        Rc::new(Expr::Add { left, right })
    }

    fn mul(left: SharedExpr, right: SharedExpr) -> SharedExpr {
        Rc::new(Expr::Mul { left, right })
    }

    #[test]
    fn parenthesises_by_precedence() {
        let storage = StorageTables::new();
        let a = Rc::new(Expr::CallValue);
        let sum = add(a.clone(), Expr::val(2usize));

        assert_eq!(expr(&mul(sum.clone(), Expr::val(3usize)), &storage), "(msg.value + 2) * 3");
        assert_eq!(expr(&add(mul(a, Expr::val(3usize)), Expr::val(1usize)), &storage), "msg.value * 3 + 1");

        let compared = Rc::new(Expr::Lt {
            left:   sum,
            right:  Expr::val(0x1_0000usize),
            equal:  false,
            signed: false,
        });
        assert_eq!(expr(&compared, &storage), "msg.value + 2 < 0x10000");
        assert_eq!(
            expr(&Rc::new(Expr::IsZero(compared)), &storage),
            "!(msg.value + 2 < 0x10000)"
        );
    }

    #[test]
    fn renders_storage_and_calldata() {
        let mut storage = StorageTables::new();
        let location = Rc::new(Expr::Sha3 {
            offset: Expr::val(0usize),
            size:   Expr::val(64usize),
            words:  Some(vec![caller(), Expr::val(3usize)]),
        });
        let load = storage.load(location);
        assert_eq!(expr(&load, &storage), "mapping1[msg.sender]");

        storage.label_mapping(KnownWord::from(3usize), "balances");
        assert_eq!(expr(&load, &storage), "balances[msg.sender]");

        let argument = Rc::new(Expr::CallDataLoad(Expr::val(36usize)));
        assert_eq!(expr(&argument, &storage), "arg1");
        assert_eq!(
            expr(&Rc::new(Expr::Sig(Selector::new([0x0c, 0x55, 0x69, 0x9c]))), &storage),
            "msg.sig == 0x0c55699c"
        );

        let raw = storage.load(caller());
        assert_eq!(expr(&raw, &storage), "storage[msg.sender]");
    }
}

//! The Yul-like dialect, where every operation is a call of a builtin and
//! storage is read and written explicitly.

use std::collections::HashMap;

use itertools::Itertools;

use crate::{
    codegen::{call, literal, BodyWriter, BranchTokens, Dialect, Fragment, INDENT},
    constant::SELECTOR_SHIFT_BITS,
    decompiler::result::Decompilation,
    inference::{field_name, StorageTables},
    signatures::Selector,
    vm::{
        inst::{Inst, Payload},
        value::{known::KnownWord, CopySource, Expr, SharedExpr},
    },
};

/// Renders `decompilation` as a Yul-like object.
///
/// The dispatcher is the object's code, and every function found in its
/// dispatch table, including the ones folded into storage accessors, is
/// defined after it.
#[must_use]
pub fn render(decompilation: &Decompilation) -> String {
    let exploration = decompilation.exploration();
    let names: HashMap<Selector, String> = decompilation
        .functions()
        .iter()
        .map(|f| (f.selector, f.label().map(str::to_string)))
        .chain(
            decompilation
                .accessors()
                .iter()
                .map(|a| (a.selector, Some(a.name.clone()))),
        )
        .map(|(selector, label)| (selector, label.unwrap_or_else(|| synthetic_name(selector))))
        .collect();
    let dialect = Yul {
        storage: decompilation.storage(),
        names:   names.clone(),
    };

    let mut lines = vec![
        "object \"Decompiled\" {".to_string(),
        format!("{INDENT}code {{"),
    ];
    lines.extend(BodyWriter::new(exploration, exploration.dispatcher, &dialect).write(2));

    for (selector, entry) in &exploration.functions {
        let name = names.get(selector).cloned().unwrap_or_else(|| synthetic_name(*selector));
        lines.push(String::new());
        lines.push(format!("{INDENT}{INDENT}function {name}() {{"));
        lines.extend(BodyWriter::new(exploration, *entry, &dialect).write(3));
        lines.push(format!("{INDENT}{INDENT}}}"));
    }
    lines.push(format!("{INDENT}}}"));
    lines.push("}".to_string());

    let mut text = lines.join("\n");
    text.push('\n');
    text
}

/// Renders `expr` in the Yul-like dialect, naming storage from `storage`.
#[must_use]
pub fn expr(expr: &SharedExpr, storage: &StorageTables) -> String {
    Yul {
        storage,
        names: HashMap::new(),
    }
    .text(expr)
}

/// Gets the name of a function whose signature is not known.
fn synthetic_name(selector: Selector) -> String {
    format!("func_{}", hex::encode(selector.bytes()))
}

/// The Yul-like spelling of expressions and statements.
struct Yul<'a> {
    storage: &'a StorageTables,
    names:   HashMap<Selector, String>,
}

impl Yul<'_> {
    fn text(&self, expr: &SharedExpr) -> String {
        self.fragment(expr).text
    }

    fn builtin(&self, name: &str, arguments: &[&SharedExpr]) -> Fragment {
        call(name, arguments.iter().map(|a| self.text(a)))
    }

    /// Negates the rendered `fragment`.
    fn negated(fragment: &Fragment) -> Fragment {
        call("iszero", [&fragment.text])
    }

    /// Gets the storage location that `slot` refers to.
    fn location(&self, slot: &SharedExpr, variable: Option<KnownWord>) -> String {
        match variable {
            Some(key) if self.storage.is_array_length(key) => {
                format!("{}.slot", self.storage.array_name(key))
            }
            Some(key) => format!("{}.slot", self.storage.variable_name(key)),
            None => self.text(slot),
        }
    }

    fn mapping_location(
        &self,
        slot: KnownWord,
        keys: &[SharedExpr],
        offset: KnownWord,
    ) -> String {
        let keys = keys.iter().map(|k| format!("[{}]", self.text(k))).join("");
        let field = if offset.is_zero_value() {
            String::new()
        } else {
            format!(".{}", field_name(offset))
        };
        format!("{}{keys}{field}.slot", self.storage.mapping_name(slot))
    }

    fn fragment(&self, expr: &SharedExpr) -> Fragment {
        match expr.as_ref() {
            Expr::Val(value) => Fragment::atom(literal(*value)),
            Expr::Add { left, right } => self.builtin("add", &[left, right]),
            Expr::Sub { left, right } => self.builtin("sub", &[left, right]),
            Expr::Mul { left, right } => self.builtin("mul", &[left, right]),
            Expr::Div { left, right } => self.builtin("div", &[left, right]),
            Expr::SDiv { left, right } => self.builtin("sdiv", &[left, right]),
            Expr::Mod { left, right } => self.builtin("mod", &[left, right]),
            Expr::SMod { left, right } => self.builtin("smod", &[left, right]),
            Expr::AddMod {
                left,
                right,
                modulus,
            } => self.builtin("addmod", &[left, right, modulus]),
            Expr::MulMod {
                left,
                right,
                modulus,
            } => self.builtin("mulmod", &[left, right, modulus]),
            Expr::Exp { base, exponent } => self.builtin("exp", &[base, exponent]),
            Expr::SignExtend { size, value } => self.builtin("signextend", &[size, value]),
            Expr::Lt {
                left,
                right,
                equal,
                signed,
            } => {
                // `a <= b` is `!(a > b)`.
                let (strict, complement) = if *signed { ("slt", "sgt") } else { ("lt", "gt") };
                if *equal {
                    Self::negated(&self.builtin(complement, &[left, right]))
                } else {
                    self.builtin(strict, &[left, right])
                }
            }
            Expr::Gt {
                left,
                right,
                equal,
                signed,
            } => {
                let (strict, complement) = if *signed { ("sgt", "slt") } else { ("gt", "lt") };
                if *equal {
                    Self::negated(&self.builtin(complement, &[left, right]))
                } else {
                    self.builtin(strict, &[left, right])
                }
            }
            Expr::Eq { left, right, equal } => {
                let eq = self.builtin("eq", &[left, right]);
                if *equal {
                    eq
                } else {
                    Self::negated(&eq)
                }
            }
            Expr::IsZero(value) => self.builtin("iszero", &[value]),
            Expr::And { left, right } => self.builtin("and", &[left, right]),
            Expr::Or { left, right } => self.builtin("or", &[left, right]),
            Expr::Xor { left, right } => self.builtin("xor", &[left, right]),
            Expr::Not(value) => self.builtin("not", &[value]),
            Expr::Byte { position, value } => self.builtin("byte", &[position, value]),
            Expr::Shl { value, shift } => self.builtin("shl", &[shift, value]),
            Expr::Shr { value, shift } => self.builtin("shr", &[shift, value]),
            Expr::Sar { value, shift } => self.builtin("sar", &[shift, value]),
            Expr::Sig(selector) => call("eq", [
                format!("shr({SELECTOR_SHIFT_BITS}, calldataload(0))"),
                selector.to_string(),
            ]),
            Expr::Prop(property) => Fragment::atom(property.yul_name()),
            Expr::Balance(address) => self.builtin("balance", &[address]),
            Expr::ExtCodeSize(address) => self.builtin("extcodesize", &[address]),
            Expr::ExtCodeHash(address) => self.builtin("extcodehash", &[address]),
            Expr::BlockHash(number) => self.builtin("blockhash", &[number]),
            Expr::BlobHash(index) => self.builtin("blobhash", &[index]),
            Expr::CallValue => Fragment::atom("callvalue()"),
            Expr::CallDataLoad(offset) => self.builtin("calldataload", &[offset]),
            Expr::CallDataSize => Fragment::atom("calldatasize()"),
            Expr::MLoad(offset) => self.builtin("mload", &[offset]),
            Expr::Sha3 { offset, size, .. } => self.builtin("keccak256", &[offset, size]),
            Expr::SLoad { slot, variable } => call("sload", [self.location(slot, *variable)]),
            Expr::MappingLoad { slot, keys, offset } => {
                call("sload", [self.mapping_location(*slot, keys, *offset)])
            }
            Expr::ArrayLoad { slot, index } => call("sload", [format!(
                "{}[{}].slot",
                self.storage.array_name(*slot),
                self.text(index)
            )]),
            Expr::TLoad(slot) => self.builtin("tload", &[slot]),
            Expr::Call {
                kind,
                gas,
                address,
                value,
                arg_offset,
                arg_size,
                ret_offset,
                ret_size,
            } => {
                let mut arguments = vec![gas, address];
                arguments.extend(value.iter());
                arguments.extend([arg_offset, arg_size, ret_offset, ret_size]);
                self.builtin(kind.yul_name(), &arguments)
            }
            Expr::Create {
                value,
                offset,
                size,
                salt: Some(salt),
            } => self.builtin("create2", &[value, offset, size, salt]),
            Expr::Create {
                value,
                offset,
                size,
                ..
            } => self.builtin("create", &[value, offset, size]),
            Expr::Copy { source, offset } => match source {
                CopySource::Code => self.builtin("codeword", &[offset]),
                CopySource::ExtCode(address) => self.builtin("extcodeword", &[address, offset]),
                CopySource::ReturnData => self.builtin("returndataword", &[offset]),
            },
            Expr::Phi { left, right } => self.builtin("phi", &[left, right]),
        }
    }

    fn range(&self, payload: &Payload) -> [String; 2] {
        [self.text(&payload.offset), self.text(&payload.size)]
    }
}

impl Dialect for Yul<'_> {
    fn statement(&self, inst: &Inst) -> Option<String> {
        let fragment = match inst {
            Inst::MStore { offset, data, byte } => {
                self.builtin(if *byte { "mstore8" } else { "mstore" }, &[offset, data])
            }
            Inst::SStore {
                slot,
                variable,
                data,
            } => call("sstore", [self.location(slot, *variable), self.text(data)]),
            Inst::MappingStore {
                slot,
                keys,
                offset,
                data,
            } => call("sstore", [
                self.mapping_location(*slot, keys, *offset),
                self.text(data),
            ]),
            Inst::ArrayStore { slot, index, data } => call("sstore", [
                format!("{}[{}].slot", self.storage.array_name(*slot), self.text(index)),
                self.text(data),
            ]),
            Inst::TStore { slot, data } => self.builtin("tstore", &[slot, data]),
            Inst::Log { topics, data, .. } => {
                let mut arguments = self.range(data).to_vec();
                arguments.extend(topics.iter().map(|t| self.text(t)));
                call(&format!("log{}", topics.len()), arguments)
            }
            Inst::Effect(expr) => self.builtin("pop", &[expr]),
            Inst::Stop => Fragment::atom("stop()"),
            Inst::Return(payload) => call("return", self.range(payload)),
            Inst::Revert(payload) => call("revert", self.range(payload)),
            Inst::SelfDestruct(address) => self.builtin("selfdestruct", &[address]),
            Inst::Invalid { .. } => Fragment::atom("invalid()"),
            Inst::Jump { .. } | Inst::JumpI { .. } | Inst::JumpDest { .. } | Inst::SigCase { .. } => {
                return None
            }
        };

        Some(fragment.text)
    }

    fn branch(&self, condition: &SharedExpr) -> BranchTokens {
        BranchTokens {
            // The taken arm comes first, so it is the case where the negation is zero.
            open:   vec![
                format!("switch {}", Self::negated(&self.fragment(condition)).text),
                "case 0 {".to_string(),
            ],
            middle: vec!["}".to_string(), "default {".to_string()],
            close:  vec!["}".to_string()],
        }
    }

    fn dispatch(&self, selector: Selector) -> Option<String> {
        let name = self.names.get(&selector).cloned().unwrap_or_else(|| synthetic_name(selector));
        Some(format!(
            "if eq(shr({SELECTOR_SHIFT_BITS}, calldataload(0)), {selector}) {{ {name}() }}"
        ))
    }

    fn label(&self, label: &str) -> String {
        format!("{label}:")
    }

    fn reference(&self, label: &str) -> String {
        format!("jump({label})")
    }
}

#[cfg(test)]
mod test {
    use std::rc::Rc;

    use crate::{
        codegen::yul::expr,
        inference::StorageTables,
        vm::value::{Expr, Property},
    };

    #[test]
    fn renders_prefix_calls() {
        let mut storage = StorageTables::new();
        let sum = Rc::new(Expr::Add {
            left:  Rc::new(Expr::CallValue),
            right: Expr::val(2usize),
        });
        let product = Rc::new(Expr::Mul {
            left:  sum,
            right: Expr::val(0x1_0000usize),
        });
        assert_eq!(expr(&product, &storage), "mul(add(callvalue(), 2), 0x10000)");

        let at_most = Rc::new(Expr::Lt {
            left:   Rc::new(Expr::CallValue),
            right:  Expr::val(3usize),
            equal:  true,
            signed: false,
        });
        assert_eq!(expr(&at_most, &storage), "iszero(gt(callvalue(), 3))");

        let variable = storage.load(Expr::val(0usize));
        assert_eq!(expr(&variable, &storage), "sload(var1.slot)");

        let entry = storage.load(Rc::new(Expr::Sha3 {
            offset: Expr::val(0usize),
            size:   Expr::val(64usize),
            words:  Some(vec![Rc::new(Expr::Prop(Property::Caller)), Expr::val(1usize)]),
        }));
        assert_eq!(expr(&entry, &storage), "sload(mapping1[caller()].slot)");
    }
}

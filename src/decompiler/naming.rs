//! The final stage of decompilation, which attaches names to what exploration
//! found and works out the attributes of each function.
//!
//! A function is folded into the storage it reads when its whole reachable
//! graph returns exactly one word, read straight out of a variable or out of a
//! mapping or array indexed by its arguments, without changing any state. The
//! function's name then becomes the label of that storage, mirroring the way
//! `public` state variables are declared.

use std::collections::{BTreeMap, BTreeSet};

use tracing::debug;

use crate::{
    constant::{WORD_SIZE_BITS, WORD_SIZE_BYTES},
    decompiler::result::{Accessor, AccessorTarget, Decompilation, Event, Function},
    inference::{types::ValueType, StorageTables},
    metadata::Metadata,
    signatures::{signature_name, signature_parameters, SignatureDatabase},
    vm::{
        dominance::Dominators,
        inst::{BlockId, Inst},
        value::{known::KnownWord, Expr, SharedExpr},
        ExplorationResult,
    },
};

/// The number of jumps followed when checking whether a branch reverts.
const REVERT_SEARCH_DEPTH: usize = 4;

/// Names the functions, storage and events in `result` using `signatures`.
#[must_use]
pub fn name(
    mut result: ExplorationResult,
    metadata: Option<Metadata>,
    signatures: &dyn SignatureDatabase,
) -> Decompilation {
    let rejects_value = guards_value_before_dispatch(&result);
    let mut functions = vec![];
    let mut accessors = vec![];
    let mut returned_types = vec![];

    for (selector, entry) in result.functions.clone() {
        let signature = signatures.function(selector).map(str::to_string);
        let insts = reachable_insts(&result, entry);

        if let Some(signature) = &signature {
            if let Some((target, typ)) = accessor_target(&insts, &result.storage) {
                let name = signature_name(signature).to_string();
                debug!(selector = %selector, name = %name, "Folded accessor into storage");
                accessors.push(Accessor {
                    selector,
                    name,
                    target,
                });
                returned_types.push((target, typ));
                continue;
            }
        }

        let payable = !rejects_value && !guards_value(&result, entry);
        let view = insts
            .iter()
            .all(|inst| !inst.mutates_state() && !matches!(inst, Inst::TStore { .. }));
        let parameters = match &signature {
            Some(signature) => signature_parameters(signature),
            None => inferred_parameters(&insts),
        };
        functions.push(Function {
            selector,
            signature,
            entry,
            parameters,
            payable,
            view,
        });
    }

    for accessor in &accessors {
        let name = accessor.name.clone();
        match accessor.target {
            AccessorTarget::Variable(slot) => result.storage.label_variable(slot, name),
            AccessorTarget::Mapping(slot) => result.storage.label_mapping(slot, name),
            AccessorTarget::Array(slot) => result.storage.label_array(slot, name),
        };
    }
    for (target, typ) in returned_types {
        if let AccessorTarget::Variable(slot) = target {
            result.storage.observe_variable_type(slot, typ);
        }
    }

    let events = events(&result, signatures);
    let fallback = does_more_than_halt(&reachable_insts(&result, result.dispatcher));

    Decompilation {
        metadata,
        exploration: result,
        functions,
        accessors,
        events,
        fallback,
    }
}

/// Gets the instructions of every block reachable from `entry`.
fn reachable_insts(result: &ExplorationResult, entry: BlockId) -> Vec<&Inst> {
    result
        .cfg(entry)
        .blocks()
        .iter()
        .filter_map(|id| result.block(*id))
        .flat_map(|block| &block.insts)
        .collect()
}

/// Works out what a function with the reachable `insts` reads if it is a
/// public accessor, along with the type of the returned value.
fn accessor_target(
    insts: &[&Inst],
    storage: &StorageTables,
) -> Option<(AccessorTarget, ValueType)> {
    if insts.iter().any(|inst| inst.mutates_state()) {
        return None;
    }
    let mut returns = insts.iter().filter_map(|inst| match inst {
        Inst::Return(payload) => Some(payload),
        _ => None,
    });
    let payload = returns.next()?;
    if returns.next().is_some() {
        return None;
    }

    let [word] = payload.words.as_deref()? else {
        return None;
    };
    let typ = ValueType::observe(word);
    let target = match unmasked(word).as_ref() {
        Expr::SLoad {
            variable: Some(slot),
            ..
        } if !storage.is_array_length(*slot) => AccessorTarget::Variable(*slot),
        Expr::MappingLoad { slot, keys, offset }
            if offset.is_zero_value() && keys.iter().all(|key| key.argument_index().is_some()) =>
        {
            AccessorTarget::Mapping(*slot)
        }
        Expr::ArrayLoad { slot, index } if index.argument_index().is_some() => {
            AccessorTarget::Array(*slot)
        }
        _ => return None,
    };

    Some((target, typ))
}

/// Strips a low-bit mask from `expr`.
fn unmasked(expr: &SharedExpr) -> &SharedExpr {
    match expr.as_ref() {
        Expr::And { left, right } => match (left.known(), right.known()) {
            (None, Some(mask)) if mask.low_mask_width().is_some() => left,
            (Some(mask), None) if mask.low_mask_width().is_some() => right,
            _ => expr,
        },
        _ => expr,
    }
}

/// Checks whether the graph from `entry` contains a branch on the call value
/// that leads straight to a revert.
fn guards_value(result: &ExplorationResult, entry: BlockId) -> bool {
    !value_guards(result, entry).is_empty()
}

/// Checks whether the dispatcher rejects value before any function is
/// dispatched to, as compilers do when no function is payable.
fn guards_value_before_dispatch(result: &ExplorationResult) -> bool {
    let cfg = result.cfg(result.dispatcher);
    let cases: Vec<BlockId> = cfg
        .blocks()
        .iter()
        .copied()
        .filter(|id| {
            result
                .block(*id)
                .and_then(|block| block.terminator())
                .is_some_and(|inst| matches!(inst, Inst::SigCase { .. }))
        })
        .collect();
    if cases.is_empty() {
        return false;
    }

    let dominators = Dominators::compute(&cfg);
    value_guards(result, result.dispatcher)
        .into_iter()
        .any(|guard| cases.iter().all(|case| dominators.dominates(guard, *case)))
}

/// Finds the blocks reachable from `entry` that branch on the call value with
/// one side reverting.
fn value_guards(result: &ExplorationResult, entry: BlockId) -> Vec<BlockId> {
    result
        .cfg(entry)
        .blocks()
        .iter()
        .copied()
        .filter(|id| {
            let Some(Inst::JumpI {
                condition,
                target,
                fallthrough,
            }) = result.block(*id).and_then(|block| block.terminator())
            else {
                return false;
            };
            condition.any(&|e| matches!(e, Expr::CallValue))
                && (reverts(result, *target) || reverts(result, *fallthrough))
        })
        .collect()
}

/// Checks whether control reaching `id` goes straight to a revert, following
/// jumps through blocks that do nothing else.
fn reverts(result: &ExplorationResult, mut id: BlockId) -> bool {
    for _ in 0..REVERT_SEARCH_DEPTH {
        let Some(block) = result.block(id) else { return false };
        match block.insts.as_slice() {
            [.., Inst::Revert(_)] => return true,
            [Inst::Jump { target } | Inst::JumpDest { fallthrough: target }] => id = *target,
            _ => return false,
        }
    }
    false
}

/// Infers the parameter types of a function without a known signature from
/// the way its arguments are read.
fn inferred_parameters(insts: &[&Inst]) -> Vec<String> {
    let mut observed: BTreeMap<usize, BTreeSet<ValueType>> = BTreeMap::new();
    for expr in insts.iter().flat_map(|inst| inst.exprs()) {
        observe_arguments(expr, &mut observed);
    }
    let Some(count) = observed.keys().max().map(|max| max + 1) else {
        return vec![];
    };

    (0..count)
        .map(|index| {
            let mut types = observed.remove(&index).unwrap_or_default();
            if types.len() > 1 {
                types.remove(&ValueType::UInt(WORD_SIZE_BITS));
            }
            ValueType::best(&types).to_string()
        })
        .collect()
}

fn observe_arguments(expr: &SharedExpr, observed: &mut BTreeMap<usize, BTreeSet<ValueType>>) {
    if let Some(index) = expr.argument_index() {
        observed.entry(index).or_default().insert(ValueType::observe(expr));
        return;
    }
    for child in expr.children() {
        observe_arguments(child, observed);
    }
}

/// Collects the events logged anywhere in the contract.
fn events(
    result: &ExplorationResult,
    signatures: &dyn SignatureDatabase,
) -> BTreeMap<KnownWord, Event> {
    let roots = std::iter::once(result.dispatcher)
        .chain(result.functions.iter().map(|(_, entry)| *entry));
    let mut events: BTreeMap<KnownWord, Event> = BTreeMap::new();

    for inst in roots.flat_map(|root| reachable_insts(result, root)) {
        let Inst::Log {
            event: Some(hash),
            topics,
            data,
        } = inst
        else {
            continue;
        };
        let data_words = match &data.words {
            Some(words) => words.len(),
            None => data
                .size
                .known()
                .and_then(|size| size.as_usize())
                .map_or(0, |size| size.div_ceil(WORD_SIZE_BYTES)),
        };
        let indexed = topics.len().saturating_sub(1);

        let event = events.entry(*hash).or_insert_with(|| Event {
            hash: *hash,
            signature: signatures.event(*hash).map(str::to_string),
            indexed,
            data_words,
        });
        event.indexed = event.indexed.max(indexed);
        event.data_words = event.data_words.max(data_words);
    }

    events
}

/// Checks whether the dispatcher's `insts` do anything other than halt.
fn does_more_than_halt(insts: &[&Inst]) -> bool {
    insts.iter().any(|inst| {
        inst.mutates_state()
            || matches!(
                inst,
                Inst::TStore { .. } | Inst::Return(_) | Inst::SelfDestruct(_)
            )
    })
}

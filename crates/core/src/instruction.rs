use retroasm_isa::{EncodeError, Encoding, Layout};

use crate::context::CompileContext;
use crate::line::{LineId, LineKind, MatchedOperand};

/// Matches the operand text against the mnemonic's addressing modes and parses the
/// placeholder expressions.
pub(crate) fn parse(ctx: &mut CompileContext<'_>, id: LineId) {
    let LineKind::Instruction(instruction) = &ctx.lines.get(id).kind else {
        return;
    };
    let (base, mnemonic, operand) = (
        instruction.base.clone(),
        instruction.mnemonic.clone(),
        instruction.operand.clone(),
    );
    let isa = ctx.isa;
    let matched = match isa.match_operand(&base, &operand.text) {
        Ok(matched) => matched,
        Err(error) => {
            let span = if operand.is_empty() {
                mnemonic.span()
            } else {
                operand.span()
            };
            ctx.fail(id, span, error.to_string());
            return;
        }
    };

    let mut expressions = Vec::with_capacity(matched.slices.len());
    for range in matched.slices {
        let token = operand.slice(range).trimmed();
        let Some(expression) = ctx.parse_expression(id, &token) else {
            return;
        };
        expressions.push((token, expression));
    }
    if let LineKind::Instruction(instruction) = &mut ctx.lines.get_mut(id).kind {
        instruction.matched = Some(MatchedOperand {
            form: matched.form,
            expressions,
        });
    }
}

fn reserved(encoding: &Encoding) -> Vec<Option<u8>> {
    encoding
        .opcode
        .iter()
        .copied()
        .map(Some)
        .chain(std::iter::repeat_n(None, usize::from(encoding.width)))
        .collect()
}

/// Evaluates the operands, picks the operand width and emits the encoded bytes. While
/// operands are unknown the widest encoding is reserved; the chosen width never shrinks
/// in later passes.
pub(crate) fn compile(ctx: &mut CompileContext<'_>, id: LineId) {
    let LineKind::Instruction(instruction) = &ctx.lines.get(id).kind else {
        return;
    };
    let Some(matched) = instruction.matched.clone() else {
        return;
    };
    let (forced_width, locked_width) = (instruction.forced_width, instruction.locked_width);
    let (mnemonic, operand) = (instruction.mnemonic.clone(), instruction.operand.clone());
    let form = matched.form;

    let values: Vec<Option<i64>> = matched
        .expressions
        .iter()
        .map(|(token, expression)| ctx.evaluate_int(id, expression, token).ok().flatten())
        .collect();
    let known: Option<Vec<i64>> = values.iter().copied().collect();
    let selector = match (form.layout(), &known) {
        (Layout::Value, Some(values)) => values.first().copied(),
        _ => None,
    };

    let encoding = match form.select(selector, forced_width, locked_width) {
        Ok(encoding) => encoding,
        Err(error @ EncodeError::WidthUnavailable { .. }) => {
            ctx.fail(id, mnemonic.span(), error.to_string());
            return;
        }
        Err(error) => {
            ctx.value_error(id, operand.span(), error.to_string());
            let widest = form.widest();
            ctx.emit(id, reserved(widest));
            return;
        }
    };
    if let LineKind::Instruction(instruction) = &mut ctx.lines.get_mut(id).kind {
        instruction.locked_width = instruction.locked_width.max(encoding.width);
    }

    let pc = ctx.lines.get(id).result.org;
    let bytes = match known {
        Some(values) => match form.encode(encoding, &values, pc) {
            Ok(bytes) => bytes.into_iter().map(Some).collect(),
            Err(error) => {
                ctx.value_error(id, operand.span(), error.to_string());
                reserved(encoding)
            }
        },
        None => reserved(encoding),
    };
    ctx.emit(id, bytes);
}

#[cfg(test)]
mod tests {
    use retroasm_assets::MemoryAssetFS;
    use retroasm_isa::Platform;

    use crate::context::{CompileContext, CompileOptions};
    use crate::line::LineState;

    fn compile(platform: Platform, text: &str) -> (Vec<u8>, Vec<String>) {
        let fs = MemoryAssetFS::new();
        let options = CompileOptions {
            platform,
            ..CompileOptions::default()
        };
        let mut ctx = CompileContext::new(options, &fs);
        ctx.add_file("test.asm", text);
        ctx.compile();
        let errors = ctx
            .diagnostics()
            .iter()
            .map(|diagnostic| diagnostic.message.clone())
            .collect();
        (ctx.image().to_flat(0, false), errors)
    }

    #[test]
    fn picks_the_narrowest_width_for_known_values() {
        let (bytes, errors) = compile(Platform::Mos6502, "lda $10\nlda $1234\nlda #1");
        assert!(errors.is_empty(), "{errors:?}");
        similar_asserts::assert_eq!(bytes, vec![0xA5, 0x10, 0xAD, 0x34, 0x12, 0xA9, 0x01]);
    }

    #[test]
    fn forward_references_keep_the_widest_width() {
        let (bytes, errors) = compile(Platform::Mos6502, "lda value\nvalue: rts");
        assert!(errors.is_empty(), "{errors:?}");
        similar_asserts::assert_eq!(bytes, vec![0xAD, 0x03, 0x00, 0x60]);
    }

    #[test]
    fn forced_widths_override_selection() {
        let (bytes, errors) = compile(Platform::W65816, "lda.l $10");
        assert!(errors.is_empty(), "{errors:?}");
        similar_asserts::assert_eq!(bytes, vec![0xAF, 0x10, 0x00, 0x00]);
    }

    #[test]
    fn branches_are_relative_to_the_next_instruction() {
        let (bytes, errors) = compile(Platform::Mos6502, "loop: dex\nbne loop");
        assert!(errors.is_empty(), "{errors:?}");
        similar_asserts::assert_eq!(bytes, vec![0xCA, 0xD0, 0xFD]);
    }

    #[test]
    fn out_of_range_branches_fail_the_line() {
        let fs = MemoryAssetFS::new();
        let options = CompileOptions {
            platform: Platform::Mos6502,
            ..CompileOptions::default()
        };
        let mut ctx = CompileContext::new(options, &fs);
        ctx.add_file("test.asm", "bne far\n.db 0\n.org $200\nfar: rts");
        ctx.compile();
        assert!(ctx.diagnostics().has_errors());
        let message = &ctx.diagnostics().as_slice()[0].message;
        assert!(message.contains("branch target out of range"), "{message}");
        let first = ctx.files()[0].lines[0];
        assert_eq!(ctx.line(first).state, LineState::Error);
    }

    #[test]
    fn unknown_operands_are_reported() {
        let (_, errors) = compile(Platform::Mos6502, "lda (1),z");
        assert_eq!(errors.len(), 1);
        assert!(errors[0].contains("does not accept"), "{}", errors[0]);
    }
}

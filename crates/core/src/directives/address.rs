use crate::context::{CompileContext, Flow};
use crate::line::LineId;

use super::Directive;

/// `.ORG` moves the logical program counter, `.BASE` the output offset.
pub(super) fn compile(ctx: &mut CompileContext<'_>, id: LineId, directive: Directive) -> Flow {
    let Ok(Some(value)) = ctx.command_int(id, 0) else {
        return Flow::Continue;
    };
    match directive {
        Directive::Base if value < 0 => {
            let span = ctx.lines.get(id).origin.span();
            ctx.fail(id, span, format!("output offset {value} is negative"));
        }
        Directive::Base => ctx.cursor.set_base(value),
        _ => ctx.cursor.set_org(value),
    }
    Flow::Continue
}

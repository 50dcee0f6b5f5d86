use crate::token::Token;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Directive {
    Org,
    Base,
    Db,
    Dw,
    Dl,
    Def,
    Enum,
    Ende,
    Dbg,
    Dwg,
    Dlg,
    Endd,
    If,
    Ifdef,
    Ifndef,
    Elseif,
    Else,
    Endif,
    Repeat,
    Endr,
    Macro,
    Endm,
    Include,
    Incbin,
    Msg,
    Error,
    Hex,
}

/// How the text after a directive keyword is cut into arguments.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArgStyle {
    /// Comma-separated expressions.
    List,
    /// The whole remainder as one argument.
    Raw,
    /// A name, then one expression (`.DEF name expr` or `.DEF name, expr`).
    NameValue,
    /// A name, then a comma-separated list (`.MACRO name p1, p2`).
    NameList,
}

#[derive(Debug)]
pub struct DirectiveSpec {
    pub directive: Directive,
    pub names: &'static [&'static str],
    pub min_args: usize,
    pub max_args: Option<usize>,
    pub allows_label: bool,
    /// Whether the directive may appear in a macro body.
    pub in_macro: bool,
    pub args: ArgStyle,
    pub end: Option<Directive>,
    pub interior: &'static [Directive],
}

const fn spec(
    directive: Directive,
    names: &'static [&'static str],
    min_args: usize,
    max_args: Option<usize>,
    allows_label: bool,
    args: ArgStyle,
) -> DirectiveSpec {
    DirectiveSpec {
        directive,
        names,
        min_args,
        max_args,
        allows_label,
        in_macro: true,
        args,
        end: None,
        interior: &[],
    }
}

const fn block(mut base: DirectiveSpec, end: Directive, interior: &'static [Directive]) -> DirectiveSpec {
    base.end = Some(end);
    base.interior = interior;
    base
}

const fn outside_macros(mut base: DirectiveSpec) -> DirectiveSpec {
    base.in_macro = false;
    base
}

use ArgStyle::{List, NameList, NameValue, Raw};
use Directive as D;

const CONDITIONAL_INTERIOR: &[Directive] = &[D::Elseif, D::Else];

static SPECS: [DirectiveSpec; 27] = [
    spec(D::Org, &[".ORG"], 1, Some(1), false, List),
    spec(D::Base, &[".BASE"], 1, Some(1), false, List),
    spec(D::Db, &[".DB", ".BYTE"], 1, None, true, List),
    spec(D::Dw, &[".DW", ".WORD"], 1, None, true, List),
    spec(D::Dl, &[".DL", ".LONG"], 1, None, true, List),
    spec(D::Def, &[".DEF", ".DEFINE"], 2, Some(2), false, NameValue),
    block(spec(D::Enum, &[".ENUM"], 0, Some(1), false, List), D::Ende, &[]),
    spec(D::Ende, &[".ENDE"], 0, Some(0), false, List),
    block(spec(D::Dbg, &[".DBG"], 0, Some(0), true, List), D::Endd, &[]),
    block(spec(D::Dwg, &[".DWG"], 0, Some(0), true, List), D::Endd, &[]),
    block(spec(D::Dlg, &[".DLG"], 0, Some(0), true, List), D::Endd, &[]),
    spec(D::Endd, &[".ENDD"], 0, Some(0), false, List),
    block(spec(D::If, &[".IF"], 1, Some(1), false, Raw), D::Endif, CONDITIONAL_INTERIOR),
    block(spec(D::Ifdef, &[".IFDEF"], 1, Some(1), false, Raw), D::Endif, CONDITIONAL_INTERIOR),
    block(spec(D::Ifndef, &[".IFNDEF"], 1, Some(1), false, Raw), D::Endif, CONDITIONAL_INTERIOR),
    spec(D::Elseif, &[".ELSEIF"], 1, Some(1), false, Raw),
    spec(D::Else, &[".ELSE"], 0, Some(0), false, Raw),
    spec(D::Endif, &[".ENDIF"], 0, Some(0), false, Raw),
    block(spec(D::Repeat, &[".REPEAT", ".REPT"], 1, Some(1), true, List), D::Endr, &[]),
    spec(D::Endr, &[".ENDR"], 0, Some(0), false, List),
    outside_macros(block(spec(D::Macro, &[".MACRO"], 1, None, false, NameList), D::Endm, &[])),
    spec(D::Endm, &[".ENDM"], 0, Some(0), false, List),
    outside_macros(spec(D::Include, &[".INCLUDE", ".INCSRC"], 1, Some(1), true, List)),
    spec(D::Incbin, &[".INCBIN"], 1, Some(3), true, List),
    spec(D::Msg, &[".MSG"], 1, None, false, List),
    spec(D::Error, &[".ERROR"], 0, None, false, List),
    spec(D::Hex, &[".HEX"], 1, Some(1), true, Raw),
];

impl Directive {
    pub fn from_keyword(word: &str) -> Option<Directive> {
        if !word.starts_with('.') {
            return None;
        }
        SPECS
            .iter()
            .find(|spec| spec.names.iter().any(|name| name.eq_ignore_ascii_case(word)))
            .map(|spec| spec.directive)
    }

    pub fn spec(self) -> &'static DirectiveSpec {
        &SPECS[self as usize]
    }

    pub fn name(self) -> &'static str {
        self.spec().names[0]
    }

    /// Start keywords that close on `end`, used when counting nesting depth.
    pub fn opens(self, end: Directive) -> bool {
        self.spec().end == Some(end)
    }

    pub fn is_end_keyword(self) -> bool {
        SPECS.iter().any(|spec| spec.end == Some(self))
    }

    /// Cell width in bytes for the data directives.
    pub fn data_width(self) -> Option<usize> {
        match self {
            Self::Db | Self::Dbg => Some(1),
            Self::Dw | Self::Dwg => Some(2),
            Self::Dl | Self::Dlg => Some(3),
            _ => None,
        }
    }

    pub fn split_args(self, rest: &Token) -> Vec<Token> {
        let rest = rest.trimmed();
        match self.spec().args {
            ArgStyle::List => rest.split_top_level(','),
            ArgStyle::Raw if rest.is_empty() => Vec::new(),
            ArgStyle::Raw => vec![rest],
            ArgStyle::NameValue | ArgStyle::NameList => {
                if rest.is_empty() {
                    return Vec::new();
                }
                let (name, tail) = rest.split_first_word();
                let mut args = vec![name];
                if self.spec().args == ArgStyle::NameValue {
                    if !tail.is_empty() {
                        args.push(tail);
                    }
                } else {
                    args.extend(tail.split_top_level(','));
                }
                args
            }
        }
    }
}

pub fn all_keywords() -> impl Iterator<Item = &'static str> {
    SPECS.iter().flat_map(|spec| spec.names.iter().copied())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::span::SourceId;

    fn token(text: &str) -> Token {
        Token::new(SourceId(0), 1, 0, 0, text)
    }

    fn texts(tokens: Vec<Token>) -> Vec<String> {
        tokens.into_iter().map(|token| token.text).collect()
    }

    #[test]
    fn table_order_matches_enum() {
        for spec in &SPECS {
            assert_eq!(spec.directive.spec().directive, spec.directive);
        }
    }

    #[test]
    fn keywords_are_case_insensitive_with_aliases() {
        assert_eq!(Directive::from_keyword(".org"), Some(Directive::Org));
        assert_eq!(Directive::from_keyword(".Byte"), Some(Directive::Db));
        assert_eq!(Directive::from_keyword(".rept"), Some(Directive::Repeat));
        assert_eq!(Directive::from_keyword(".loop"), None);
        assert_eq!(Directive::from_keyword("org"), None);
    }

    #[test]
    fn block_relationships() {
        assert!(Directive::Ifdef.opens(Directive::Endif));
        assert!(!Directive::Elseif.opens(Directive::Endif));
        assert!(Directive::Endd.is_end_keyword());
        assert!(!Directive::Else.is_end_keyword());
        assert!(!Directive::Macro.spec().in_macro);
    }

    #[test]
    fn splits_arguments_per_style() {
        assert_eq!(texts(Directive::Db.split_args(&token(" 1, \"a,b\" , 3"))), ["1", "\"a,b\"", "3"]);
        assert_eq!(texts(Directive::Def.split_args(&token("speed 3 * 4"))), ["speed", "3 * 4"]);
        assert_eq!(texts(Directive::Def.split_args(&token("speed, 2"))), ["speed", "2"]);
        assert_eq!(texts(Directive::Macro.split_args(&token("move src, dst"))), ["move", "src", "dst"]);
        assert_eq!(texts(Directive::If.split_args(&token("a > 1, 2"))), ["a > 1, 2"]);
        assert!(Directive::Else.split_args(&token("  ")).is_empty());
    }
}

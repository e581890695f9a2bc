//! Static catalogue of STX marks with longest-match lookup.

/// Marks recognized at the start of a block.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BlockMark {
    Heading(u8),
    UnorderedItem,
    OrderedItem,
    HeaderRow,
    DataRow,
    Cell,
    PreCaption,
    PostCaption,
    CodeFence,
    CommentFence,
    LiteralFence,
    ContentOpen,
    ContentClose,
    Attribute,
    Directive,
    Exit,
}

/// Marks recognized inside paragraph text.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InlineMark {
    Strong,
    Emphasis,
    Code,
    Deleted,
    DoubleQuote,
    SingleQuote,
    Ellipsis,
    LinkOpen,
    LinkClose,
    ReferenceOpen,
    ReferenceClose,
    FunctionOpen,
    FunctionClose,
    ContentOpen,
    ContentClose,
    Escape,
}

#[derive(Debug, Clone, Copy)]
pub struct MarkSpec<M: 'static> {
    pub text: &'static str,
    pub mark: M,
    /// The mark must be followed by whitespace or the end of the line.
    pub spaced: bool,
}

const fn spec<M>(text: &'static str, mark: M, spaced: bool) -> MarkSpec<M> {
    MarkSpec { text, mark, spaced }
}

pub static BLOCK_MARKS: &[MarkSpec<BlockMark>] = &[
    spec("======", BlockMark::Heading(6), true),
    spec("=====", BlockMark::Heading(5), true),
    spec("====", BlockMark::Heading(4), true),
    spec("===", BlockMark::Heading(3), true),
    spec("==", BlockMark::Heading(2), true),
    spec("=", BlockMark::Heading(1), true),
    spec("-", BlockMark::UnorderedItem, true),
    spec(".", BlockMark::OrderedItem, true),
    spec("|=", BlockMark::HeaderRow, true),
    spec("|-", BlockMark::DataRow, true),
    spec("|", BlockMark::Cell, true),
    spec("::", BlockMark::PreCaption, true),
    spec(":^", BlockMark::PostCaption, true),
    spec("```", BlockMark::CodeFence, false),
    spec("!!!", BlockMark::CommentFence, false),
    spec("+++", BlockMark::LiteralFence, false),
    spec("{{{", BlockMark::ContentOpen, false),
    spec("}}}", BlockMark::ContentClose, false),
    spec("@", BlockMark::Attribute, false),
    spec("#", BlockMark::Directive, false),
    spec("%", BlockMark::Exit, true),
];

pub static INLINE_MARKS: &[MarkSpec<InlineMark>] = &[
    spec("*", InlineMark::Strong, false),
    spec("_", InlineMark::Emphasis, false),
    spec("`", InlineMark::Code, false),
    spec("~~", InlineMark::Deleted, false),
    spec("\"\"", InlineMark::DoubleQuote, false),
    spec("''", InlineMark::SingleQuote, false),
    spec("...", InlineMark::Ellipsis, false),
    spec("[", InlineMark::LinkOpen, false),
    spec("]", InlineMark::LinkClose, false),
    spec("(", InlineMark::ReferenceOpen, false),
    spec(")", InlineMark::ReferenceClose, false),
    spec("<", InlineMark::FunctionOpen, false),
    spec(">", InlineMark::FunctionClose, false),
    spec("{", InlineMark::ContentOpen, false),
    spec("}", InlineMark::ContentClose, false),
    spec("\\", InlineMark::Escape, false),
];

/// Characters that may follow the escape character.
pub const ESCAPABLE: &str = "=-.|:^@#!%+~*_`\"'[]()<>{}\\";

pub const ESCAPE_CHAR: char = '\\';

impl BlockMark {
    #[must_use]
    pub fn text(self) -> &'static str {
        BLOCK_MARKS
            .iter()
            .find(|spec| spec.mark == self)
            .map_or("", |spec| spec.text)
    }
}

impl InlineMark {
    #[must_use]
    pub fn text(self) -> &'static str {
        INLINE_MARKS
            .iter()
            .find(|spec| spec.mark == self)
            .map_or("", |spec| spec.text)
    }
}

/// The longest mark in `candidates` that `window` starts with.
#[must_use]
pub fn match_longest<M: Copy>(
    window: &str,
    candidates: &'static [MarkSpec<M>],
) -> Option<MarkSpec<M>> {
    candidates
        .iter()
        .filter(|spec| window.starts_with(spec.text))
        .filter(|spec| !spec.spaced || is_boundary(&window[spec.text.len()..]))
        .max_by_key(|spec| spec.text.len())
        .copied()
}

fn is_boundary(rest: &str) -> bool {
    matches!(rest.chars().next(), None | Some(' ' | '\t' | '\n'))
}

#[must_use]
pub fn is_escapable(c: char) -> bool {
    ESCAPABLE.contains(c)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn block(window: &str) -> Option<BlockMark> {
        match_longest(window, BLOCK_MARKS).map(|spec| spec.mark)
    }

    #[test]
    fn test_heading_levels_use_longest_match() {
        assert_eq!(block("= A"), Some(BlockMark::Heading(1)));
        assert_eq!(block("=== A"), Some(BlockMark::Heading(3)));
        assert_eq!(block("======"), Some(BlockMark::Heading(6)));
        assert_eq!(block("======= A"), None);
    }

    #[test]
    fn test_spaced_marks_need_a_boundary() {
        assert_eq!(block("- item"), Some(BlockMark::UnorderedItem));
        assert_eq!(block("-5 degrees"), None);
        assert_eq!(block(".net"), None);
        assert_eq!(block("::\n"), Some(BlockMark::PreCaption));
        assert_eq!(block("|= a"), Some(BlockMark::HeaderRow));
        assert_eq!(block("| a"), Some(BlockMark::Cell));
    }

    #[test]
    fn test_sigils_and_fences_need_no_boundary() {
        assert_eq!(block("@ref: x"), Some(BlockMark::Attribute));
        assert_eq!(block("#title: x"), Some(BlockMark::Directive));
        assert_eq!(block("```rust"), Some(BlockMark::CodeFence));
        assert_eq!(block("{{{ admonition"), Some(BlockMark::ContentOpen));
        assert_eq!(block("}}}"), Some(BlockMark::ContentClose));
        assert_eq!(block("!!!"), Some(BlockMark::CommentFence));
        assert_eq!(block("+++ code: rust"), Some(BlockMark::LiteralFence));
    }

    #[test]
    fn test_exit_mark_stands_alone() {
        assert_eq!(block("%"), Some(BlockMark::Exit));
        assert_eq!(block("% trailing"), Some(BlockMark::Exit));
        assert_eq!(block("%50 off"), None);
    }

    #[test]
    fn test_inline_marks() {
        let inline = |w: &str| match_longest(w, INLINE_MARKS).map(|s| s.mark);
        assert_eq!(inline("~~gone~~"), Some(InlineMark::Deleted));
        assert_eq!(inline("~"), None);
        assert_eq!(inline("\"\"quoted\"\""), Some(InlineMark::DoubleQuote));
        assert_eq!(inline("''quoted''"), Some(InlineMark::SingleQuote));
        assert_eq!(inline("\"lone"), None);
        assert_eq!(inline("...and"), Some(InlineMark::Ellipsis));
        assert_eq!(inline(".."), None);
        assert_eq!(inline("<img>"), Some(InlineMark::FunctionOpen));
        assert_eq!(inline("plain"), None);
    }

    #[test]
    fn test_mark_text() {
        assert_eq!(BlockMark::Heading(2).text(), "==");
        assert_eq!(InlineMark::Deleted.text(), "~~");
    }
}

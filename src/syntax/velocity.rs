//! Velocity Template Language tokenizer
//!
//! Scans one line at a time. Block comments (`#* *#`), unparsed blocks
//! (`#[[ ]]#`) and directive argument lists left open at the end of a line
//! are carried to the next line through [`LineState`]; everything else ends
//! with the line.

use super::{HighlightSpan, LineState, SpanBuilder, StyleTag, Tokenizer};

/// Directive keywords recognized after `#` (or inside `#{...}`)
pub const DIRECTIVES: &[&str] = &[
    "set", "if", "elseif", "else", "end", "foreach", "macro", "parse", "include", "evaluate",
    "define", "stop", "break",
];

/// Directives followed by a parenthesized argument list
pub(crate) const ARG_DIRECTIVES: &[&str] = &[
    "set", "if", "elseif", "foreach", "macro", "parse", "include", "evaluate", "define",
];

/// Helper functions callable as `$name(...)` on the context root
pub const HELPER_FUNCTIONS: &[&str] = &["format_date"];

const WORD_OPERATORS: &[&str] = &["in", "and", "or", "not", "eq", "ne", "lt", "gt", "le", "ge"];
const LITERALS: &[&str] = &["true", "false", "null"];

/// Tokenizer for Velocity templates
#[derive(Debug, Clone, Copy, Default)]
pub struct VelocityTokenizer;

impl Tokenizer for VelocityTokenizer {
    fn name(&self) -> &'static str {
        "Velocity"
    }

    fn highlight_line(&self, line: &str, state: LineState) -> (Vec<HighlightSpan>, LineState) {
        let chars: Vec<char> = line.chars().collect();
        let mut scanner = Scanner {
            chars: &chars,
            pos: 0,
            spans: SpanBuilder::default(),
        };
        let state = scanner.run(state);
        (scanner.spans.finish(), state)
    }
}

pub(crate) fn is_ident_start(c: char) -> bool {
    c.is_ascii_alphabetic() || c == '_'
}

pub(crate) fn is_ident_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || c == '_'
}

fn is_operator(c: char) -> bool {
    matches!(
        c,
        '=' | '!' | '<' | '>' | '&' | '|' | '+' | '-' | '*' | '/' | '%'
    )
}

struct Scanner<'a> {
    chars: &'a [char],
    pos: usize,
    spans: SpanBuilder,
}

impl Scanner<'_> {
    fn run(&mut self, state: LineState) -> LineState {
        match state {
            LineState::Normal => {}
            LineState::InBlockComment => {
                if !self.close_region(0, 0, "*#", StyleTag::Comment) {
                    return LineState::InBlockComment;
                }
            }
            LineState::InUnparsed => {
                if !self.close_region(0, 0, "]]#", StyleTag::Unparsed) {
                    return LineState::InUnparsed;
                }
            }
            LineState::InDirectiveArgs { depth } => {
                let depth = self.scan_args(depth);
                if depth > 0 {
                    return LineState::InDirectiveArgs { depth };
                }
            }
        }
        self.scan_normal()
    }

    fn scan_normal(&mut self) -> LineState {
        while self.pos < self.chars.len() {
            match self.chars[self.pos] {
                '\\' if matches!(self.peek(1), Some('$' | '#')) => self.pos += 2,
                '#' => {
                    if let Some(state) = self.scan_hash() {
                        return state;
                    }
                }
                '$' => {
                    self.scan_reference(false);
                }
                _ => self.pos += 1,
            }
        }
        LineState::Normal
    }

    /// Scan a `#`-prefixed construct. Returns the line's end state when the
    /// construct runs to the end of the line.
    fn scan_hash(&mut self) -> Option<LineState> {
        let start = self.pos;
        if self.starts_with(start, "##") {
            self.spans.push(start, self.chars.len(), StyleTag::Comment);
            self.pos = self.chars.len();
            return Some(LineState::Normal);
        }
        if self.starts_with(start, "#*") {
            let closed = self.close_region(start, start + 2, "*#", StyleTag::Comment);
            return (!closed).then_some(LineState::InBlockComment);
        }
        if self.starts_with(start, "#[[") {
            let closed = self.close_region(start, start + 3, "]]#", StyleTag::Unparsed);
            return (!closed).then_some(LineState::InUnparsed);
        }

        let Some((name, name_end)) = directive_name(self.chars, start) else {
            self.pos += 1;
            return None;
        };
        self.pos = name_end;

        let takes_args = if DIRECTIVES.contains(&name.as_str()) {
            self.spans.push(start, name_end, StyleTag::Directive);
            ARG_DIRECTIVES.contains(&name.as_str())
        } else if self.chars.get(name_end) == Some(&'(') {
            self.spans.push(start, name_end, StyleTag::Macro);
            true
        } else {
            return None;
        };
        if !takes_args {
            return None;
        }

        let open = skip_blanks(self.chars, name_end);
        if self.chars.get(open) != Some(&'(') {
            return None;
        }
        self.spans.push(open, open + 1, StyleTag::Punctuation);
        self.pos = open + 1;
        let depth = self.scan_args(1);
        (depth > 0).then_some(LineState::InDirectiveArgs { depth })
    }

    /// Style `start` through the `close` marker, searching from `search_from`.
    /// Styles to the end of the line and returns false when the marker is absent.
    fn close_region(
        &mut self,
        start: usize,
        search_from: usize,
        close: &str,
        style: StyleTag,
    ) -> bool {
        match find(self.chars, close, search_from) {
            Some(idx) => {
                let end = idx + close.len();
                self.spans.push(start, end, style);
                self.pos = end;
                true
            }
            None => {
                self.spans.push(start, self.chars.len(), style);
                self.pos = self.chars.len();
                false
            }
        }
    }

    /// Scan `$name`, `$!name`, `${name}` with its property/method/index chain.
    ///
    /// Returns how many brackets of a call or index are still open at the end
    /// of the line. Only an unbraced reference inside directive arguments
    /// (`in_args`) may continue on the next line; anywhere else an unclosed
    /// reference is styled `Error` and 0 is returned.
    fn scan_reference(&mut self, in_args: bool) -> u16 {
        let start = self.pos;
        let mut p = start + 1;
        if self.chars.get(p) == Some(&'!') {
            p += 1;
        }
        let braced = self.chars.get(p) == Some(&'{');
        if braced {
            p += 1;
        }
        if !self.chars.get(p).is_some_and(|c| is_ident_start(*c)) {
            self.pos = start + 1;
            return 0;
        }

        let mark = self.spans.mark();
        let ident_end = ident_end(self.chars, p);
        self.spans.push(start, ident_end, StyleTag::Variable);
        self.pos = ident_end;

        let name: String = self.chars[p..ident_end].iter().collect();
        let mut open = 0;
        if self.chars.get(ident_end) == Some(&'(') && HELPER_FUNCTIONS.contains(&name.as_str()) {
            open = self.scan_group(ident_end);
        }
        if open == 0 {
            open = self.scan_reference_tail();
        }
        if open > 0 && in_args && !braced {
            return open;
        }

        let mut well_formed = open == 0;
        if well_formed && braced {
            if self.chars.get(self.pos) == Some(&'}') {
                self.spans.push(self.pos, self.pos + 1, StyleTag::Variable);
                self.pos += 1;
            } else {
                well_formed = false;
            }
        }
        if !well_formed {
            self.spans
                .collapse_from(mark, start, self.pos.max(start + 1), StyleTag::Error);
        }
        0
    }

    /// Scan `.property`, `.method(args)` and `[index]` segments. Returns the
    /// depth of a call or index still open at the end of the line.
    fn scan_reference_tail(&mut self) -> u16 {
        loop {
            let open = match self.chars.get(self.pos) {
                Some('.') if self.peek(1).is_some_and(is_ident_start) => {
                    let name_end = ident_end(self.chars, self.pos + 1);
                    if self.chars.get(name_end) == Some(&'(') {
                        self.spans.push(self.pos, name_end, StyleTag::Method);
                        self.scan_group(name_end)
                    } else {
                        self.spans.push(self.pos, name_end, StyleTag::Property);
                        self.pos = name_end;
                        0
                    }
                }
                Some('[') => self.scan_group(self.pos),
                _ => return 0,
            };
            if open > 0 {
                return open;
            }
        }
    }

    /// Scan a bracketed group opening at `open`. Returns the depth still open
    /// at the end of the line, 0 when it closes.
    fn scan_group(&mut self, open: usize) -> u16 {
        self.spans.push(open, open + 1, StyleTag::Punctuation);
        self.pos = open + 1;
        self.scan_args(1)
    }

    /// Scan expression text until `depth` nested brackets close or the line
    /// ends. Returns the remaining depth.
    fn scan_args(&mut self, mut depth: u16) -> u16 {
        while depth > 0 && self.pos < self.chars.len() {
            let start = self.pos;
            let c = self.chars[start];
            match c {
                '"' | '\'' => self.scan_string(c),
                '$' => {
                    let open = self.scan_reference(true);
                    depth = depth.saturating_add(open);
                }
                '(' | '[' | '{' => {
                    self.spans.push(start, start + 1, StyleTag::Punctuation);
                    depth = depth.saturating_add(1);
                    self.pos += 1;
                }
                ')' | ']' | '}' => {
                    self.spans.push(start, start + 1, StyleTag::Punctuation);
                    depth -= 1;
                    self.pos += 1;
                }
                '.' if self.peek(1) == Some('.') => {
                    self.spans.push(start, start + 2, StyleTag::Operator);
                    self.pos += 2;
                }
                ',' | ':' => {
                    self.spans.push(start, start + 1, StyleTag::Punctuation);
                    self.pos += 1;
                }
                c if c.is_ascii_digit() => {
                    let end = number_end(self.chars, start);
                    self.spans.push(start, end, StyleTag::Number);
                    self.pos = end;
                }
                c if is_operator(c) => {
                    let mut end = start + 1;
                    while self.chars.get(end).is_some_and(|c| is_operator(*c)) {
                        end += 1;
                    }
                    self.spans.push(start, end, StyleTag::Operator);
                    self.pos = end;
                }
                c if is_ident_start(c) => {
                    let end = ident_end(self.chars, start);
                    let word: String = self.chars[start..end].iter().collect();
                    if WORD_OPERATORS.contains(&word.as_str()) {
                        self.spans.push(start, end, StyleTag::Keyword);
                    } else if LITERALS.contains(&word.as_str()) {
                        self.spans.push(start, end, StyleTag::Literal);
                    }
                    self.pos = end;
                }
                _ => self.pos += 1,
            }
        }
        depth
    }

    /// Scan a quoted string. An unterminated string ends with the line.
    fn scan_string(&mut self, quote: char) {
        let start = self.pos;
        let mut end = start + 1;
        while end < self.chars.len() && self.chars[end] != quote {
            end += 1;
        }
        let end = (end + 1).min(self.chars.len());
        self.spans.push(start, end, StyleTag::String);
        self.pos = end;
    }

    fn peek(&self, offset: usize) -> Option<char> {
        self.chars.get(self.pos + offset).copied()
    }

    fn starts_with(&self, pos: usize, pattern: &str) -> bool {
        starts_with(self.chars, pos, pattern)
    }
}

/// Parse `#name` or `#{name}` at `start`. Returns the name and the index
/// just past it.
pub(crate) fn directive_name(chars: &[char], start: usize) -> Option<(String, usize)> {
    let mut p = start + 1;
    let braced = chars.get(p) == Some(&'{');
    if braced {
        p += 1;
    }
    if !chars.get(p).is_some_and(|c| is_ident_start(*c)) {
        return None;
    }
    let end = ident_end(chars, p);
    let name: String = chars[p..end].iter().collect();
    if braced {
        if chars.get(end) != Some(&'}') {
            return None;
        }
        return Some((name, end + 1));
    }
    Some((name, end))
}

pub(crate) fn ident_end(chars: &[char], start: usize) -> usize {
    let mut end = start;
    while chars.get(end).is_some_and(|c| is_ident_char(*c)) {
        end += 1;
    }
    end
}

pub(crate) fn skip_blanks(chars: &[char], start: usize) -> usize {
    let mut end = start;
    while matches!(chars.get(end), Some(' ' | '\t')) {
        end += 1;
    }
    end
}

pub(crate) fn starts_with(chars: &[char], pos: usize, pattern: &str) -> bool {
    let mut idx = pos;
    for expected in pattern.chars() {
        if chars.get(idx) != Some(&expected) {
            return false;
        }
        idx += 1;
    }
    true
}

pub(crate) fn find(chars: &[char], pattern: &str, from: usize) -> Option<usize> {
    let pattern: Vec<char> = pattern.chars().collect();
    if from >= chars.len() || pattern.is_empty() {
        return None;
    }
    chars[from..]
        .windows(pattern.len())
        .position(|window| window == pattern.as_slice())
        .map(|idx| idx + from)
}

fn number_end(chars: &[char], start: usize) -> usize {
    let mut end = start;
    while chars.get(end).is_some_and(|c| c.is_ascii_digit()) {
        end += 1;
    }
    if chars.get(end) == Some(&'.') && chars.get(end + 1).is_some_and(|c| c.is_ascii_digit()) {
        end += 1;
        while chars.get(end).is_some_and(|c| c.is_ascii_digit()) {
            end += 1;
        }
    }
    end
}

#[cfg(test)]
mod tests {
    use super::*;

    fn highlight(line: &str, state: LineState) -> (Vec<(String, StyleTag)>, LineState) {
        let (spans, state) = VelocityTokenizer.highlight_line(line, state);
        let chars: Vec<char> = line.chars().collect();
        let pieces = spans
            .iter()
            .map(|s| (chars[s.start..s.end()].iter().collect(), s.style))
            .collect();
        (pieces, state)
    }

    fn piece(text: &str, style: StyleTag) -> (String, StyleTag) {
        (text.to_string(), style)
    }

    #[test]
    fn test_plain_text_has_no_spans() {
        let (pieces, state) = highlight("Hello, world! 100% # done", LineState::Normal);
        assert!(pieces.is_empty());
        assert_eq!(state, LineState::Normal);
    }

    #[test]
    fn test_line_comment_runs_to_end() {
        let (pieces, state) = highlight("text ## note #if($x)", LineState::Normal);
        assert_eq!(pieces, vec![piece("## note #if($x)", StyleTag::Comment)]);
        assert_eq!(state, LineState::Normal);
    }

    #[test]
    fn test_directive_with_args() {
        let (pieces, state) = highlight("#if($user.age >= 18)", LineState::Normal);
        assert_eq!(
            pieces,
            vec![
                piece("#if", StyleTag::Directive),
                piece("(", StyleTag::Punctuation),
                piece("$user", StyleTag::Variable),
                piece(".age", StyleTag::Property),
                piece(">=", StyleTag::Operator),
                piece("18", StyleTag::Number),
                piece(")", StyleTag::Punctuation),
            ]
        );
        assert_eq!(state, LineState::Normal);
    }

    #[test]
    fn test_braced_directive_and_end() {
        let (pieces, _) = highlight("a#{else}b #end", LineState::Normal);
        assert_eq!(
            pieces,
            vec![
                piece("#{else}", StyleTag::Directive),
                piece("#end", StyleTag::Directive),
            ]
        );
    }

    #[test]
    fn test_unknown_hash_word_is_text() {
        let (pieces, _) = highlight("#hashtag and #ff0000", LineState::Normal);
        assert!(pieces.is_empty());
    }

    #[test]
    fn test_macro_call() {
        let (pieces, _) = highlight("#greet('Ann')", LineState::Normal);
        assert_eq!(
            pieces,
            vec![
                piece("#greet", StyleTag::Macro),
                piece("(", StyleTag::Punctuation),
                piece("'Ann'", StyleTag::String),
                piece(")", StyleTag::Punctuation),
            ]
        );
    }

    #[test]
    fn test_reference_forms() {
        let (pieces, _) = highlight("$a $!b ${c} $!{d.e}", LineState::Normal);
        assert_eq!(
            pieces,
            vec![
                piece("$a", StyleTag::Variable),
                piece("$!b", StyleTag::Variable),
                piece("${c", StyleTag::Variable),
                piece("}", StyleTag::Variable),
                piece("$!{d", StyleTag::Variable),
                piece(".e", StyleTag::Property),
                piece("}", StyleTag::Variable),
            ]
        );
    }

    #[test]
    fn test_method_call_with_tricky_string() {
        let (pieces, state) = highlight("$map.get(\"a)(]\").size() done", LineState::Normal);
        assert_eq!(
            pieces,
            vec![
                piece("$map", StyleTag::Variable),
                piece(".get", StyleTag::Method),
                piece("(", StyleTag::Punctuation),
                piece("\"a)(]\"", StyleTag::String),
                piece(")", StyleTag::Punctuation),
                piece(".size", StyleTag::Method),
                piece("(", StyleTag::Punctuation),
                piece(")", StyleTag::Punctuation),
            ]
        );
        assert_eq!(state, LineState::Normal);
    }

    #[test]
    fn test_index_and_nested_reference() {
        let (pieces, _) = highlight("$items[$i].name", LineState::Normal);
        assert_eq!(
            pieces,
            vec![
                piece("$items", StyleTag::Variable),
                piece("[", StyleTag::Punctuation),
                piece("$i", StyleTag::Variable),
                piece("]", StyleTag::Punctuation),
                piece(".name", StyleTag::Property),
            ]
        );
    }

    #[test]
    fn test_trailing_dot_is_text() {
        let (pieces, _) = highlight("Hello $name.", LineState::Normal);
        assert_eq!(pieces, vec![piece("$name", StyleTag::Variable)]);
    }

    #[test]
    fn test_unclosed_brace_reference_is_error() {
        let (pieces, _) = highlight("Hi ${name there", LineState::Normal);
        assert_eq!(pieces, vec![piece("${name", StyleTag::Error)]);
    }

    #[test]
    fn test_unclosed_call_is_error_and_does_not_persist() {
        let (pieces, state) = highlight("$a.b(1, ", LineState::Normal);
        assert_eq!(pieces, vec![piece("$a.b(1, ", StyleTag::Error)]);
        assert_eq!(state, LineState::Normal);
    }

    #[test]
    fn test_escapes_are_text() {
        let (pieces, _) = highlight("\\$price \\#if", LineState::Normal);
        assert!(pieces.is_empty());
    }

    #[test]
    fn test_block_comment_across_lines() {
        let (pieces, state) = highlight("a #* start", LineState::Normal);
        assert_eq!(pieces, vec![piece("#* start", StyleTag::Comment)]);
        assert_eq!(state, LineState::InBlockComment);

        let (pieces, state) = highlight("$still #if", state);
        assert_eq!(pieces, vec![piece("$still #if", StyleTag::Comment)]);
        assert_eq!(state, LineState::InBlockComment);

        let (pieces, state) = highlight("end *# $x", state);
        assert_eq!(
            pieces,
            vec![
                piece("end *#", StyleTag::Comment),
                piece("$x", StyleTag::Variable),
            ]
        );
        assert_eq!(state, LineState::Normal);
    }

    #[test]
    fn test_comment_marker_does_not_close_itself() {
        let (_, state) = highlight("#*#", LineState::Normal);
        assert_eq!(state, LineState::InBlockComment);
    }

    #[test]
    fn test_unparsed_block() {
        let (pieces, state) = highlight("#[[ $raw", LineState::Normal);
        assert_eq!(pieces, vec![piece("#[[ $raw", StyleTag::Unparsed)]);
        assert_eq!(state, LineState::InUnparsed);

        let (pieces, state) = highlight("#if ]]#$x", state);
        assert_eq!(
            pieces,
            vec![
                piece("#if ]]#", StyleTag::Unparsed),
                piece("$x", StyleTag::Variable),
            ]
        );
        assert_eq!(state, LineState::Normal);
    }

    #[test]
    fn test_directive_args_span_lines() {
        let (pieces, state) = highlight("#if( $a &&", LineState::Normal);
        assert_eq!(
            pieces,
            vec![
                piece("#if", StyleTag::Directive),
                piece("(", StyleTag::Punctuation),
                piece("$a", StyleTag::Variable),
                piece("&&", StyleTag::Operator),
            ]
        );
        assert_eq!(state, LineState::InDirectiveArgs { depth: 1 });

        let (pieces, state) = highlight("  ($b or $c)) yes", state);
        assert_eq!(
            pieces,
            vec![
                piece("(", StyleTag::Punctuation),
                piece("$b", StyleTag::Variable),
                piece("or", StyleTag::Keyword),
                piece("$c", StyleTag::Variable),
                piece(")", StyleTag::Punctuation),
                piece(")", StyleTag::Punctuation),
            ]
        );
        assert_eq!(state, LineState::Normal);
    }

    #[test]
    fn test_open_call_inside_directive_args_continues() {
        let (pieces, state) = highlight("#set($x = $m.get(", LineState::Normal);
        assert_eq!(
            pieces,
            vec![
                piece("#set", StyleTag::Directive),
                piece("(", StyleTag::Punctuation),
                piece("$x", StyleTag::Variable),
                piece("=", StyleTag::Operator),
                piece("$m", StyleTag::Variable),
                piece(".get", StyleTag::Method),
                piece("(", StyleTag::Punctuation),
            ]
        );
        assert_eq!(state, LineState::InDirectiveArgs { depth: 2 });

        let (pieces, state) = highlight(" 'k')) $x", state);
        assert_eq!(
            pieces,
            vec![
                piece("'k'", StyleTag::String),
                piece(")", StyleTag::Punctuation),
                piece(")", StyleTag::Punctuation),
                piece("$x", StyleTag::Variable),
            ]
        );
        assert_eq!(state, LineState::Normal);
    }

    #[test]
    fn test_open_braced_reference_in_args_is_still_error() {
        let (pieces, state) = highlight("#if(${a.b(", LineState::Normal);
        assert_eq!(pieces.last(), Some(&piece("${a.b(", StyleTag::Error)));
        assert_eq!(state, LineState::InDirectiveArgs { depth: 1 });
    }

    #[test]
    fn test_foreach_range_and_literals() {
        let (pieces, _) = highlight("#foreach($i in [1..3]) #set($ok = true)", LineState::Normal);
        let styles: Vec<StyleTag> = pieces.iter().map(|(_, s)| *s).collect();
        assert!(pieces.contains(&piece("in", StyleTag::Keyword)));
        assert!(pieces.contains(&piece("..", StyleTag::Operator)));
        assert!(pieces.contains(&piece("1", StyleTag::Number)));
        assert!(pieces.contains(&piece("true", StyleTag::Literal)));
        assert_eq!(
            styles.iter().filter(|s| **s == StyleTag::Directive).count(),
            2
        );
    }

    #[test]
    fn test_helper_call_on_root() {
        let (pieces, _) = highlight("$format_date('%Y') $name(s)", LineState::Normal);
        assert_eq!(
            pieces,
            vec![
                piece("$format_date", StyleTag::Variable),
                piece("(", StyleTag::Punctuation),
                piece("'%Y'", StyleTag::String),
                piece(")", StyleTag::Punctuation),
                piece("$name", StyleTag::Variable),
            ]
        );
    }

    #[test]
    fn test_non_ascii_columns_are_chars() {
        let (spans, _) = VelocityTokenizer.highlight_line("héllo wörld $name", LineState::Normal);
        assert_eq!(spans, vec![HighlightSpan::new(12, 17, StyleTag::Variable)]);
    }
}

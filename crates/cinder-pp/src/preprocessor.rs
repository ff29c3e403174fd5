use std::path::Path;

use crate::client::{CancelChecker, Cancelled, Client, IncludeKind, MacroArgumentReference};
use crate::expr;
use crate::macros::Macro;

/// Directive-level preprocessor.
///
/// Scans logical lines (after line-continuation splicing), keeps the
/// conditional-compilation state, expands macros in active text lines, and
/// reports definitions, uses, skipped regions, include guards and include
/// directives to the [`Client`]. The output is the macro-expanded text of
/// the active lines; directive lines are consumed and not emitted.
#[derive(Default)]
pub struct Preprocessor {
    cancel: Option<CancelChecker>,
}

impl Preprocessor {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_cancel_checker(&mut self, cancel: Option<CancelChecker>) {
        self.cancel = cancel;
    }

    pub fn run(&self, file: &Path, source: &str, client: &mut dyn Client) -> Result<String, Cancelled> {
        let mut run = Run {
            file,
            cancel: self.cancel.as_ref(),
            out: String::with_capacity(source.len()),
            conds: Vec::new(),
            skip_open: false,
            guard: GuardState::Start,
        };
        run.process(source, client)?;
        Ok(run.out)
    }
}

/// One conditional level (`#if` .. `#endif`).
struct Cond {
    /// Whether the current branch emits text (parent activity folded in).
    active: bool,
    /// Whether any branch of this chain has been taken; suppresses `#elif`.
    taken: bool,
    seen_else: bool,
}

enum GuardState {
    /// Nothing significant seen yet; an `#ifndef` can still open a guard.
    Start,
    /// Saw `#ifndef NAME`; the next significant line must be `#define NAME`.
    ExpectDefine(String),
    /// Guard opened; waiting for its `#endif`.
    Armed(String),
    /// Guard closed; any further significant content invalidates it.
    Closed(String),
    Invalid,
}

/// Offsets of a piece of text within its logical line, for use-site callbacks.
struct OffsetCtx<'a> {
    line_no: u32,
    line: &'a str,
    line_byte_start: usize,
    line_utf16_start: usize,
    text_offset_in_line: usize,
}

impl OffsetCtx<'_> {
    fn abs(&self, idx_in_text: usize) -> (usize, usize) {
        let in_line = self.text_offset_in_line + idx_in_text;
        let bytes = self.line_byte_start + in_line;
        let utf16 = self.line_utf16_start + utf16_len(&self.line[..in_line]);
        (bytes, utf16)
    }
}

struct Run<'a> {
    file: &'a Path,
    cancel: Option<&'a CancelChecker>,
    out: String,
    conds: Vec<Cond>,
    skip_open: bool,
    guard: GuardState,
}

impl Run<'_> {
    fn process(&mut self, source: &str, client: &mut dyn Client) -> Result<(), Cancelled> {
        let total_utf16 = utf16_len(source);
        let mut lines = source.split('\n').peekable();
        let mut byte_offset = 0usize;
        let mut utf16_offset = 0usize;
        let mut line_no = 0u32;

        let mut logical = String::new();
        while let Some(physical) = lines.next() {
            // A trailing newline leaves one empty remainder segment behind;
            // it is not a source line.
            if physical.is_empty() && lines.peek().is_none() {
                break;
            }
            line_no += 1;
            let line_byte_start = byte_offset;
            let line_utf16_start = utf16_offset;
            let first_line_no = line_no;

            byte_offset += physical.len() + 1;
            utf16_offset += utf16_len(physical) + 1;

            // Splice line continuations into one logical line.
            logical.clear();
            let mut current = physical;
            loop {
                match current.strip_suffix('\\') {
                    Some(stem) if lines.peek().is_some() => {
                        logical.push_str(stem);
                        current = lines.next().unwrap_or_default();
                        line_no += 1;
                        byte_offset += current.len() + 1;
                        utf16_offset += utf16_len(current) + 1;
                    }
                    _ => {
                        logical.push_str(current);
                        break;
                    }
                }
            }

            if let Some(cancel) = self.cancel {
                if cancel() {
                    return Err(Cancelled);
                }
            }

            let active_before = self.active();
            self.handle_line(
                &logical,
                first_line_no,
                line_byte_start,
                line_utf16_start,
                client,
            )?;
            let active_after = self.active();

            if active_before && !active_after {
                // The skipped region starts right after the directive line.
                client.start_skipping_blocks(utf16_offset.min(total_utf16));
                self.skip_open = true;
            } else if !active_before && active_after && self.skip_open {
                client.stop_skipping_blocks(line_utf16_start);
                self.skip_open = false;
            }
        }

        if self.skip_open {
            // Unterminated conditional; close the region at end of input.
            client.stop_skipping_blocks(total_utf16);
            self.skip_open = false;
        }
        if !self.conds.is_empty() {
            tracing::debug!(
                target: "cinder.pp",
                file = %self.file.display(),
                open_levels = self.conds.len(),
                "unbalanced conditional at end of file"
            );
        } else if let GuardState::Closed(name) = &self.guard {
            client.mark_as_include_guard(name);
        }
        Ok(())
    }

    fn active(&self) -> bool {
        self.conds.iter().all(|c| c.active)
    }

    /// Activity of everything below the innermost conditional level.
    fn parent_active(&self) -> bool {
        let n = self.conds.len();
        n > 0 && self.conds[..n - 1].iter().all(|c| c.active)
    }

    fn handle_line(
        &mut self,
        line: &str,
        line_no: u32,
        line_byte_start: usize,
        line_utf16_start: usize,
        client: &mut dyn Client,
    ) -> Result<(), Cancelled> {
        let trimmed = line.trim_start();
        let Some(directive) = trimmed.strip_prefix('#') else {
            if self.active() {
                if is_significant_text(trimmed) {
                    self.note_significant();
                }
                let ctx = OffsetCtx {
                    line_no,
                    line,
                    line_byte_start,
                    line_utf16_start,
                    text_offset_in_line: 0,
                };
                let expanded = self.expand_text(line, Some(&ctx), false, &mut Vec::new(), client);
                self.out.push_str(&expanded);
                self.out.push('\n');
            }
            return Ok(());
        };

        let directive = directive.trim_start();
        let name_end = directive
            .find(|c: char| !is_ident_char(c))
            .unwrap_or(directive.len());
        let (name, operand) = directive.split_at(name_end);
        let operand = strip_line_comment(operand).trim();
        let operand_offset_in_line = offset_of(line, operand);
        let (operand_bytes, operand_utf16) =
            offsets_at(line, line_byte_start, line_utf16_start, operand_offset_in_line);

        match name {
            "if" => {
                let parent = self.active();
                let value = parent
                    && self.eval_condition(operand, line_no, operand_bytes, operand_utf16, client);
                self.conds.push(Cond {
                    active: value,
                    // Never re-activate chains nested in an inactive region.
                    taken: value || !parent,
                    seen_else: false,
                });
                self.note_significant();
            }
            "ifdef" | "ifndef" => {
                if self.active() {
                    let macro_name = leading_identifier(operand);
                    let resolved = client
                        .env()
                        .resolve(macro_name)
                        .filter(|m| !m.is_hidden())
                        .cloned();
                    match &resolved {
                        Some(mac) => client
                            .passed_macro_definition_check(operand_bytes, operand_utf16, line_no, mac),
                        None => {
                            client.failed_macro_definition_check(operand_bytes, operand_utf16, macro_name)
                        }
                    }
                    if name == "ifndef" && !macro_name.is_empty() {
                        self.note_guard_candidate(macro_name);
                    } else {
                        self.note_significant();
                    }
                    let defined = resolved.is_some();
                    let value = if name == "ifdef" { defined } else { !defined };
                    self.conds.push(Cond {
                        active: value,
                        taken: value,
                        seen_else: false,
                    });
                } else {
                    self.conds.push(Cond {
                        active: false,
                        taken: true,
                        seen_else: false,
                    });
                }
            }
            "elif" => {
                if let Some((taken, seen_else)) =
                    self.conds.last().map(|level| (level.taken, level.seen_else))
                {
                    let value = if taken || seen_else {
                        false
                    } else {
                        self.parent_active()
                            && self.eval_condition(operand, line_no, operand_bytes, operand_utf16, client)
                    };
                    let level = self.conds.last_mut().expect("checked non-empty above");
                    level.active = value;
                    level.taken |= value;
                }
            }
            "else" => {
                let parent = self.parent_active();
                if let Some(level) = self.conds.last_mut() {
                    level.active = parent && !level.taken && !level.seen_else;
                    level.taken = true;
                    level.seen_else = true;
                }
            }
            "endif" => {
                self.conds.pop();
                if self.conds.is_empty() {
                    let state = std::mem::replace(&mut self.guard, GuardState::Invalid);
                    self.guard = match state {
                        GuardState::Armed(guard) => GuardState::Closed(guard),
                        _ => GuardState::Invalid,
                    };
                }
            }
            "define" if self.active() => {
                if let Some(mac) = self.parse_define(operand, line_no) {
                    self.note_define(mac.name());
                    client.env().add(mac.clone());
                    client.macro_added(&mac);
                }
            }
            "undef" if self.active() => {
                let macro_name = leading_identifier(operand);
                if !macro_name.is_empty() {
                    let mac = Macro::undef(macro_name, self.file, line_no);
                    client.env().add(mac.clone());
                    client.macro_added(&mac);
                }
                self.note_significant();
            }
            "include" | "include_next" if self.active() => {
                self.note_significant();
                let next = name == "include_next";
                let parsed = match parse_include_operand(operand, next) {
                    Some(parsed) => Some(parsed),
                    None => {
                        // Computed include: expand macros and retry.
                        let expanded =
                            self.expand_text(operand, None, false, &mut Vec::new(), client);
                        parse_include_operand(&expanded, next)
                    }
                };
                match parsed {
                    Some((spelling, kind)) => client.source_needed(line_no, &spelling, kind)?,
                    None => tracing::debug!(
                        target: "cinder.pp",
                        file = %self.file.display(),
                        line = line_no,
                        operand,
                        "unparsable include directive"
                    ),
                }
            }
            _ => {
                // #pragma, #error, #line, unknown directives, or define/undef/
                // include inside an inactive region.
                if self.active() && !name.is_empty() {
                    self.note_significant();
                }
            }
        }
        Ok(())
    }

    fn parse_define(&self, operand: &str, line_no: u32) -> Option<Macro> {
        let name_end = operand
            .find(|c: char| !is_ident_char(c))
            .unwrap_or(operand.len());
        if name_end == 0 {
            return None;
        }
        let name = &operand[..name_end];
        let rest = &operand[name_end..];

        // A parameter list only counts when the '(' immediately follows the name.
        if let Some(params_and_body) = rest.strip_prefix('(') {
            let close = params_and_body.find(')')?;
            let params: Vec<String> = params_and_body[..close]
                .split(',')
                .map(|p| p.trim().to_string())
                .filter(|p| !p.is_empty())
                .collect();
            let body = params_and_body[close + 1..].trim();
            Some(Macro::function(name, params, body, self.file, line_no))
        } else {
            Some(Macro::object(name, rest.trim(), self.file, line_no))
        }
    }

    fn eval_condition(
        &mut self,
        expr_text: &str,
        line_no: u32,
        abs_bytes: usize,
        abs_utf16: usize,
        client: &mut dyn Client,
    ) -> bool {
        let substituted = self.substitute_defined(expr_text, line_no, abs_bytes, abs_utf16, client);
        // After defined-substitution, offsets inside the condition are
        // approximate; references report positions within the expression.
        let ctx = OffsetCtx {
            line_no,
            line: substituted.as_str(),
            line_byte_start: abs_bytes,
            line_utf16_start: abs_utf16,
            text_offset_in_line: 0,
        };
        let expanded = self.expand_text(&substituted, Some(&ctx), true, &mut Vec::new(), client);
        expr::evaluate(&expanded)
    }

    /// Replaces `defined(X)` / `defined X` with `1` or `0`, reporting the checks.
    fn substitute_defined(
        &self,
        text: &str,
        line_no: u32,
        abs_bytes: usize,
        abs_utf16: usize,
        client: &mut dyn Client,
    ) -> String {
        let bytes = text.as_bytes();
        let mut out = String::with_capacity(text.len());
        let mut idx = 0usize;
        while let Some(found_rel) = text[idx..].find("defined") {
            let found = idx + found_rel;
            let after_keyword = found + "defined".len();
            let standalone = (found == 0 || !is_ident_char(bytes[found - 1] as char))
                && (after_keyword >= text.len() || !is_ident_char(bytes[after_keyword] as char));
            if !standalone {
                out.push_str(&text[idx..after_keyword]);
                idx = after_keyword;
                continue;
            }

            let mut k = after_keyword;
            while k < text.len() && (bytes[k] as char).is_whitespace() {
                k += 1;
            }
            let parenthesized = bytes.get(k) == Some(&b'(');
            if parenthesized {
                k += 1;
                while k < text.len() && (bytes[k] as char).is_whitespace() {
                    k += 1;
                }
            }
            let name_start = k;
            while k < text.len() && is_ident_char(bytes[k] as char) {
                k += 1;
            }
            let name = &text[name_start..k];
            if name.is_empty() {
                out.push_str(&text[idx..after_keyword]);
                idx = after_keyword;
                continue;
            }
            if parenthesized {
                while k < text.len() && (bytes[k] as char).is_whitespace() {
                    k += 1;
                }
                if bytes.get(k) == Some(&b')') {
                    k += 1;
                }
            }

            out.push_str(&text[idx..found]);
            let bytes_offset = abs_bytes + name_start;
            let utf16_offset = abs_utf16 + utf16_len(&text[..name_start]);
            let resolved = client.env().resolve(name).filter(|m| !m.is_hidden()).cloned();
            match &resolved {
                Some(mac) => {
                    client.passed_macro_definition_check(bytes_offset, utf16_offset, line_no, mac);
                    out.push('1');
                }
                None => {
                    client.failed_macro_definition_check(bytes_offset, utf16_offset, name);
                    out.push('0');
                }
            }
            idx = k;
        }
        out.push_str(&text[idx..]);
        out
    }

    /// Expands macros in `text`.
    ///
    /// With `reference_only` the expansion is for a `#if` condition: uses are
    /// reported via `notify_macro_reference` instead of the expanding pair.
    /// `ctx` is `None` for nested rescans, which report nothing.
    fn expand_text(
        &self,
        text: &str,
        ctx: Option<&OffsetCtx<'_>>,
        reference_only: bool,
        busy: &mut Vec<String>,
        client: &mut dyn Client,
    ) -> String {
        let mut out = String::with_capacity(text.len());
        let mut i = 0usize;
        let mut in_quote: Option<char> = None;
        let bytes = text.as_bytes();

        while i < text.len() {
            let c = text[i..].chars().next().unwrap_or('\0');

            if let Some(quote) = in_quote {
                out.push(c);
                if c == '\\' && i + 1 < text.len() {
                    // Copy the escaped character verbatim.
                    let escaped = text[i + 1..].chars().next().unwrap_or('\0');
                    out.push(escaped);
                    i += 1 + escaped.len_utf8();
                    continue;
                }
                if c == quote {
                    in_quote = None;
                }
                i += c.len_utf8();
                continue;
            }
            if c == '"' || c == '\'' {
                in_quote = Some(c);
                out.push(c);
                i += 1;
                continue;
            }
            if !(c.is_ascii_alphabetic() || c == '_') {
                out.push(c);
                i += c.len_utf8();
                continue;
            }

            let mut j = i + 1;
            while j < text.len() && is_ident_char(bytes[j] as char) {
                j += 1;
            }
            let name = &text[i..j];

            let resolved = if busy.iter().any(|b| b == name) {
                None
            } else {
                client.env().resolve(name).filter(|m| !m.is_hidden()).cloned()
            };
            let Some(mac) = resolved else {
                out.push_str(name);
                i = j;
                continue;
            };

            if mac.is_function_like() {
                let mut k = j;
                while k < text.len() && (bytes[k] as char).is_whitespace() {
                    k += 1;
                }
                let Some((args, spans, end)) = parse_invocation(text, k) else {
                    // A function-like macro name without an argument list is
                    // not an invocation.
                    out.push_str(name);
                    i = j;
                    continue;
                };

                if let Some(ctx) = ctx {
                    let (bytes_offset, utf16_offset) = ctx.abs(i);
                    if reference_only {
                        client.notify_macro_reference(bytes_offset, utf16_offset, ctx.line_no, &mac);
                    } else {
                        let actuals: Vec<MacroArgumentReference> = spans
                            .iter()
                            .map(|&(start, len)| {
                                let (b, u) = ctx.abs(start);
                                MacroArgumentReference {
                                    bytes_offset: b,
                                    bytes_length: len,
                                    utf16_offset: u,
                                    utf16_length: utf16_len(&text[start..start + len]),
                                }
                            })
                            .collect();
                        client.start_expanding_macro(bytes_offset, utf16_offset, ctx.line_no, &mac, &actuals);
                    }
                }

                let substituted = substitute_parameters(&mac, &args);
                busy.push(name.to_string());
                let expanded = self.expand_text(&substituted, None, false, busy, client);
                busy.pop();
                out.push_str(&expanded);

                if let Some(ctx) = ctx {
                    if !reference_only {
                        client.stop_expanding_macro(ctx.abs(end).0, &mac);
                    }
                }
                i = end;
            } else {
                if let Some(ctx) = ctx {
                    let (bytes_offset, utf16_offset) = ctx.abs(i);
                    if reference_only {
                        client.notify_macro_reference(bytes_offset, utf16_offset, ctx.line_no, &mac);
                    } else {
                        client.start_expanding_macro(bytes_offset, utf16_offset, ctx.line_no, &mac, &[]);
                    }
                }

                busy.push(name.to_string());
                let expanded = self.expand_text(mac.definition(), None, false, busy, client);
                busy.pop();
                out.push_str(&expanded);

                if let Some(ctx) = ctx {
                    if !reference_only {
                        client.stop_expanding_macro(ctx.abs(j).0, &mac);
                    }
                }
                i = j;
            }
        }
        out
    }

    fn note_guard_candidate(&mut self, name: &str) {
        let state = std::mem::replace(&mut self.guard, GuardState::Invalid);
        self.guard = match state {
            GuardState::Start if self.conds.is_empty() => GuardState::ExpectDefine(name.to_string()),
            _ => GuardState::Invalid,
        };
    }

    fn note_define(&mut self, name: &str) {
        let state = std::mem::replace(&mut self.guard, GuardState::Invalid);
        self.guard = match state {
            GuardState::ExpectDefine(guard) if guard == name && self.conds.len() == 1 => {
                GuardState::Armed(guard)
            }
            GuardState::Armed(guard) => GuardState::Armed(guard),
            _ => GuardState::Invalid,
        };
    }

    fn note_significant(&mut self) {
        let state = std::mem::replace(&mut self.guard, GuardState::Invalid);
        self.guard = match state {
            // Content inside the guarded region is fine.
            GuardState::Armed(guard) => GuardState::Armed(guard),
            _ => GuardState::Invalid,
        };
    }
}

fn is_ident_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || c == '_'
}

fn leading_identifier(text: &str) -> &str {
    let end = text.find(|c: char| !is_ident_char(c)).unwrap_or(text.len());
    &text[..end]
}

fn is_significant_text(trimmed: &str) -> bool {
    !trimmed.is_empty() && !trimmed.starts_with("//")
}

fn utf16_len(text: &str) -> usize {
    text.chars().map(char::len_utf16).sum()
}

fn offsets_at(
    line: &str,
    line_byte_start: usize,
    line_utf16_start: usize,
    offset_in_line: usize,
) -> (usize, usize) {
    (
        line_byte_start + offset_in_line,
        line_utf16_start + utf16_len(&line[..offset_in_line]),
    )
}

/// Byte offset of `part` within `line`; `part` must be a subslice of `line`.
fn offset_of(line: &str, part: &str) -> usize {
    let line_ptr = line.as_ptr() as usize;
    let part_ptr = part.as_ptr() as usize;
    if part_ptr >= line_ptr && part_ptr <= line_ptr + line.len() {
        part_ptr - line_ptr
    } else {
        0
    }
}

/// Strips a trailing `//` comment, respecting string and character literals.
fn strip_line_comment(text: &str) -> &str {
    let bytes = text.as_bytes();
    let mut in_quote: Option<u8> = None;
    let mut i = 0;
    while i < bytes.len() {
        match in_quote {
            Some(q) => {
                if bytes[i] == b'\\' {
                    i += 1;
                } else if bytes[i] == q {
                    in_quote = None;
                }
            }
            None => {
                if bytes[i] == b'"' || bytes[i] == b'\'' {
                    in_quote = Some(bytes[i]);
                } else if bytes[i] == b'/' && bytes.get(i + 1) == Some(&b'/') {
                    return &text[..i];
                }
            }
        }
        i += 1;
    }
    text
}

fn parse_include_operand(operand: &str, next: bool) -> Option<(String, IncludeKind)> {
    let operand = operand.trim();
    if let Some(rest) = operand.strip_prefix('<') {
        let (spelling, _) = rest.split_once('>')?;
        let kind = if next { IncludeKind::Next } else { IncludeKind::Global };
        return Some((spelling.to_string(), kind));
    }
    if let Some(rest) = operand.strip_prefix('"') {
        let (spelling, _) = rest.split_once('"')?;
        let kind = if next { IncludeKind::Next } else { IncludeKind::Local };
        return Some((spelling.to_string(), kind));
    }
    None
}

/// Parses a function-like invocation's argument list starting at `open`
/// (which must index a `(`). Returns the argument texts, their (offset, len)
/// spans, and the index just past the closing `)`.
fn parse_invocation(text: &str, open: usize) -> Option<(Vec<String>, Vec<(usize, usize)>, usize)> {
    let bytes = text.as_bytes();
    if bytes.get(open) != Some(&b'(') {
        return None;
    }

    let mut args = Vec::new();
    let mut spans = Vec::new();
    let mut depth = 1usize;
    let mut arg_start = open + 1;
    let mut in_quote: Option<u8> = None;
    let mut i = open + 1;
    while i < bytes.len() {
        let b = bytes[i];
        match in_quote {
            Some(q) => {
                if b == b'\\' {
                    i += 1;
                } else if b == q {
                    in_quote = None;
                }
            }
            None => match b {
                b'"' | b'\'' => in_quote = Some(b),
                b'(' => depth += 1,
                b')' => {
                    depth -= 1;
                    if depth == 0 {
                        let raw = &text[arg_start..i];
                        if !(args.is_empty() && raw.trim().is_empty()) {
                            push_arg(text, arg_start, i, &mut args, &mut spans);
                        }
                        return Some((args, spans, i + 1));
                    }
                }
                b',' if depth == 1 => {
                    push_arg(text, arg_start, i, &mut args, &mut spans);
                    arg_start = i + 1;
                }
                _ => {}
            },
        }
        i += 1;
    }
    None
}

fn push_arg(
    text: &str,
    start: usize,
    end: usize,
    args: &mut Vec<String>,
    spans: &mut Vec<(usize, usize)>,
) {
    let raw = &text[start..end];
    let trimmed = raw.trim();
    let lead = raw.len() - raw.trim_start().len();
    args.push(trimmed.to_string());
    spans.push((start + lead, trimmed.len()));
}

/// Substitutes formal parameters (and `__VA_ARGS__`) in a function-like
/// macro's replacement text. Token pasting and stringizing are out of scope.
fn substitute_parameters(mac: &Macro, args: &[String]) -> String {
    let params = mac.parameters();
    let variadic_from = params.iter().position(|p| p == "...");
    let body = mac.definition();
    let bytes = body.as_bytes();

    let mut out = String::with_capacity(body.len());
    let mut i = 0usize;
    let mut in_quote: Option<char> = None;
    while i < body.len() {
        let c = body[i..].chars().next().unwrap_or('\0');
        if let Some(q) = in_quote {
            out.push(c);
            if c == '\\' && i + 1 < body.len() {
                let escaped = body[i + 1..].chars().next().unwrap_or('\0');
                out.push(escaped);
                i += 1 + escaped.len_utf8();
                continue;
            }
            if c == q {
                in_quote = None;
            }
            i += c.len_utf8();
            continue;
        }
        if c == '"' || c == '\'' {
            in_quote = Some(c);
            out.push(c);
            i += 1;
            continue;
        }
        if !(c.is_ascii_alphabetic() || c == '_') {
            out.push(c);
            i += c.len_utf8();
            continue;
        }
        let mut j = i + 1;
        while j < body.len() && is_ident_char(bytes[j] as char) {
            j += 1;
        }
        let name = &body[i..j];
        if name == "__VA_ARGS__" {
            if let Some(from) = variadic_from {
                out.push_str(&args.get(from..).unwrap_or(&[]).join(", "));
            }
        } else if let Some(pos) = params.iter().position(|p| p == name) {
            if let Some(arg) = args.get(pos) {
                out.push_str(arg);
            }
        } else {
            out.push_str(name);
        }
        i = j;
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::environment::Environment;

    #[derive(Default)]
    struct RecordingClient {
        env: Environment,
        defined: Vec<String>,
        includes: Vec<(u32, String, IncludeKind)>,
        guards: Vec<String>,
        skipped: Vec<(usize, usize)>,
        open_skip: Option<usize>,
        expansions: Vec<String>,
        references: Vec<String>,
        passed_checks: Vec<String>,
        failed_checks: Vec<String>,
    }

    impl Client for RecordingClient {
        fn env(&mut self) -> &mut Environment {
            &mut self.env
        }

        fn macro_added(&mut self, mac: &Macro) {
            self.defined.push(mac.name().to_string());
        }

        fn passed_macro_definition_check(&mut self, _: usize, _: usize, _: u32, mac: &Macro) {
            self.passed_checks.push(mac.name().to_string());
        }

        fn failed_macro_definition_check(&mut self, _: usize, _: usize, name: &str) {
            self.failed_checks.push(name.to_string());
        }

        fn notify_macro_reference(&mut self, _: usize, _: usize, _: u32, mac: &Macro) {
            self.references.push(mac.name().to_string());
        }

        fn start_expanding_macro(
            &mut self,
            _: usize,
            _: usize,
            _: u32,
            mac: &Macro,
            _: &[MacroArgumentReference],
        ) {
            self.expansions.push(mac.name().to_string());
        }

        fn stop_expanding_macro(&mut self, _: usize, _: &Macro) {}

        fn mark_as_include_guard(&mut self, macro_name: &str) {
            self.guards.push(macro_name.to_string());
        }

        fn start_skipping_blocks(&mut self, utf16_offset: usize) {
            self.open_skip = Some(utf16_offset);
        }

        fn stop_skipping_blocks(&mut self, utf16_offset: usize) {
            let start = self.open_skip.take().expect("skip started");
            self.skipped.push((start, utf16_offset));
        }

        fn source_needed(&mut self, line: u32, spelling: &str, kind: IncludeKind) -> Result<(), Cancelled> {
            self.includes.push((line, spelling.to_string(), kind));
            Ok(())
        }
    }

    fn run(source: &str) -> (String, RecordingClient) {
        let mut client = RecordingClient::default();
        let pp = Preprocessor::new();
        let out = pp
            .run(Path::new("/p/test.cpp"), source, &mut client)
            .expect("not cancelled");
        (out, client)
    }

    #[test]
    fn object_macro_expansion() {
        let (out, client) = run("#define N 1\nint v = N;\n");
        assert_eq!(out, "int v = 1;\n");
        assert_eq!(client.defined, ["N"]);
        assert_eq!(client.expansions, ["N"]);
    }

    #[test]
    fn function_macro_expansion_with_arguments() {
        let (out, client) = run("#define ADD(a, b) ((a) + (b))\nint v = ADD(2, 3);\n");
        assert_eq!(out, "int v = ((2) + (3));\n");
        assert_eq!(client.expansions, ["ADD"]);
    }

    #[test]
    fn trailing_newline_is_not_duplicated() {
        let (out, _) = run("int x;\n");
        assert_eq!(out, "int x;\n");
        let (out, _) = run("int x;");
        assert_eq!(out, "int x;\n");
        let (out, _) = run("a\n\nb\n");
        assert_eq!(out, "a\n\nb\n");
        let (out, _) = run("");
        assert_eq!(out, "");
    }

    #[test]
    fn recursive_macro_terminates() {
        let (out, _) = run("#define A A\nA\n");
        assert_eq!(out, "A\n");
    }

    #[test]
    fn include_directives_reach_the_client() {
        let (_, client) = run("#include \"local.h\"\n#include <global.h>\n#include_next <n.h>\n");
        assert_eq!(
            client.includes,
            [
                (1, "local.h".to_string(), IncludeKind::Local),
                (2, "global.h".to_string(), IncludeKind::Global),
                (3, "n.h".to_string(), IncludeKind::Next),
            ]
        );
    }

    #[test]
    fn if_zero_blocks_are_skipped_and_reported() {
        let source = "a\n#if 0\nhidden\n#endif\nb\n";
        let (out, client) = run(source);
        assert_eq!(out, "a\nb\n");
        assert_eq!(client.skipped.len(), 1);
        let (start, stop) = client.skipped[0];
        assert!(start < stop);
        assert_eq!(&source[start..stop], "hidden\n");
    }

    #[test]
    fn ifdef_checks_report_pass_and_fail() {
        let (out, client) = run("#define X\n#ifdef X\nyes\n#endif\n#ifdef Y\nno\n#endif\n");
        assert_eq!(out, "yes\n");
        assert_eq!(client.passed_checks, ["X"]);
        assert_eq!(client.failed_checks, ["Y"]);
    }

    #[test]
    fn elif_and_else_branches() {
        let source = "#define V 2\n#if V == 1\na\n#elif V == 2\nb\n#else\nc\n#endif\n";
        let (out, client) = run(source);
        assert_eq!(out, "b\n");
        assert_eq!(client.references, ["V", "V"]);
    }

    #[test]
    fn defined_operator() {
        let (out, client) = run("#define X 0\n#if defined(X) && !defined Y\nbody\n#endif\n");
        assert_eq!(out, "body\n");
        assert_eq!(client.passed_checks, ["X"]);
        assert_eq!(client.failed_checks, ["Y"]);
    }

    #[test]
    fn undef_hides_macro() {
        let (out, client) = run("#define N 1\n#undef N\nint v = N;\n");
        assert_eq!(out, "int v = N;\n");
        assert_eq!(client.defined, ["N", "N"]);
        assert!(client.env.resolve("N").unwrap().is_hidden());
    }

    #[test]
    fn include_guard_is_detected() {
        let (_, client) = run("#ifndef A_H\n#define A_H\nint v;\n#endif\n");
        assert_eq!(client.guards, ["A_H"]);
    }

    #[test]
    fn content_after_guard_invalidates_it() {
        let (_, client) = run("#ifndef A_H\n#define A_H\n#endif\nint after;\n");
        assert!(client.guards.is_empty());
    }

    #[test]
    fn line_continuations_are_spliced() {
        let (out, client) = run("#define LONG 1 + \\\n2\nint v = LONG;\n");
        assert_eq!(client.defined, ["LONG"]);
        assert_eq!(out, "int v = 1 + 2;\n");
    }

    #[test]
    fn macros_are_not_expanded_in_string_literals() {
        let (out, _) = run("#define N 1\nconst char *s = \"N\";\n");
        assert_eq!(out, "const char *s = \"N\";\n");
    }

    #[test]
    fn cancellation_stops_the_run() {
        let mut pp = Preprocessor::new();
        pp.set_cancel_checker(Some(std::sync::Arc::new(|| true)));
        let mut client = RecordingClient::default();
        let result = pp.run(Path::new("/p/test.cpp"), "int x;\n", &mut client);
        assert_eq!(result, Err(Cancelled));
    }
}

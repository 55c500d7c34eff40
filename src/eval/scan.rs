//! Scanner
//!
//! Turns source text into cells. Arrays are built bottom up with an
//! explicit stack of open brackets, so deeply nested input does not
//! recurse. Arrays stay unmanaged until the whole text has scanned
//! successfully; on failure they are freed.

use std::ops::Range;

use thiserror::Error;

use super::{
    error::ExecutionError,
    memory::{
        bitset::{parse_hex, Bitset},
        cell::{Cell, Sigil},
        context::make_text,
        flavor::Flavor,
        heap::Heap,
        heart::Heart,
        stub::{Flex, StubId},
        symbol::SymbolTable,
    },
};

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ScanError {
    #[error("unexpected character '{1}'")]
    Unexpected(Range<usize>, char),
    #[error("unexpected end of input in {1}")]
    Unterminated(Range<usize>, &'static str),
    #[error("unmatched '{1}'")]
    Unmatched(Range<usize>, char),
    #[error("invalid number {1}")]
    BadNumber(Range<usize>, String),
    #[error("invalid binary {1}")]
    BadHex(Range<usize>, String),
    #[error("invalid bitset literal")]
    BadBitset(Range<usize>),
    #[error("cannot construct value: {1}")]
    Construct(Range<usize>, String),
}

impl ScanError {
    /// Byte range of the offending text
    pub fn span(&self) -> Range<usize> {
        match self {
            ScanError::Unexpected(s, _)
            | ScanError::Unterminated(s, _)
            | ScanError::Unmatched(s, _)
            | ScanError::BadNumber(s, _)
            | ScanError::BadHex(s, _)
            | ScanError::BadBitset(s)
            | ScanError::Construct(s, _) => s.clone(),
        }
    }
}

/// Scan a whole text into a managed `Source` array
pub fn transcode(
    heap: &mut Heap,
    symbols: &mut SymbolTable,
    text: &str,
) -> Result<StubId, ScanError> {
    let manuals = heap.manuals_height();
    let mut scanner = Scanner::new(text);

    let result = (|| -> Result<StubId, ScanError> {
        let mut cells = vec![];
        while let Some(cell) = scanner.next_value(heap, symbols)? {
            cells.push(cell);
        }
        let block = scanner.alloc_array(heap, cells, 0..text.len())?;
        scanner.finish(heap)?;
        Ok(block)
    })();

    if result.is_err() {
        let freed = heap.free_manuals_above(manuals);
        log::debug!("scan failed, freed {} arrays", freed);
    }
    result
}

/// An array whose closing bracket has not been seen
struct Open {
    heart: Heart,
    close: char,
    start: usize,
    quotes: u32,
    quasi: bool,
    cells: Vec<Cell>,
}

fn is_delimiter(c: char) -> bool {
    c.is_whitespace() || matches!(c, '[' | ']' | '(' | ')' | ';' | '"' | ',')
}

fn is_word_start(c: char) -> bool {
    c.is_alphabetic() || matches!(c, '-' | '!' | '?' | '*' | '+' | '=' | '<' | '>' | '&' | '|' | '@' | '$' | '%')
}

fn is_word_char(c: char) -> bool {
    is_word_start(c) || c.is_numeric() || c == '_' || c == '\''
}

pub struct Scanner<'text> {
    text: &'text str,
    /// byte offset of the next character
    pos: usize,
    /// arrays allocated so far, managed once scanning succeeds
    arrays: Vec<StubId>,
}

impl<'text> Scanner<'text> {
    pub fn new(text: &'text str) -> Self {
        Scanner {
            text,
            pos: 0,
            arrays: vec![],
        }
    }

    pub fn position(&self) -> usize {
        self.pos
    }

    fn rest(&self) -> &'text str {
        &self.text[self.pos..]
    }

    fn peek(&self) -> Option<char> {
        self.rest().chars().next()
    }

    fn peek_second(&self) -> Option<char> {
        self.rest().chars().nth(1)
    }

    fn bump(&mut self) -> Option<char> {
        let c = self.peek()?;
        self.pos += c.len_utf8();
        Some(c)
    }

    fn at_delimiter(&self) -> bool {
        self.peek().map_or(true, is_delimiter)
    }

    /// Skip whitespace and `;` comments
    fn skip_trivia(&mut self) {
        while let Some(c) = self.peek() {
            if c.is_whitespace() {
                self.bump();
            } else if c == ';' {
                while let Some(c) = self.bump() {
                    if c == '\n' {
                        break;
                    }
                }
            } else {
                break;
            }
        }
    }

    /// Next complete value at the top level, or `None` at the end of
    /// the text
    pub fn next_value(
        &mut self,
        heap: &mut Heap,
        symbols: &mut SymbolTable,
    ) -> Result<Option<Cell>, ScanError> {
        let mut open: Vec<Open> = vec![];

        loop {
            self.skip_trivia();
            let start = self.pos;

            let mut quotes = 0;
            while self.peek() == Some('\'') {
                self.bump();
                quotes += 1;
            }

            let c = match self.peek() {
                Some(c) => c,
                None => {
                    if let Some(o) = open.last() {
                        return Err(ScanError::Unterminated(o.start..self.pos, "array"));
                    }
                    if quotes > 0 {
                        return Err(ScanError::Unexpected(start..self.pos, '\''));
                    }
                    return Ok(None);
                }
            };

            let quasi_open = c == '~' && matches!(self.peek_second(), Some('[') | Some('('));
            let cell = match c {
                '[' | '(' | '~' if c != '~' || quasi_open => {
                    if quasi_open {
                        self.bump();
                    }
                    let (heart, close) = match self.bump() {
                        Some('[') => (Heart::Block, ']'),
                        _ => (Heart::Group, ')'),
                    };
                    open.push(Open {
                        heart,
                        close,
                        start,
                        quotes,
                        quasi: quasi_open,
                        cells: vec![],
                    });
                    continue;
                }
                ']' | ')' => {
                    self.bump();
                    if quotes > 0 {
                        return Err(ScanError::Unexpected(start..self.pos, c));
                    }
                    let o = match open.pop() {
                        Some(o) if o.close == c => o,
                        _ => return Err(ScanError::Unmatched(start..self.pos, c)),
                    };
                    if o.quasi && self.bump() != Some('~') {
                        return Err(ScanError::Unterminated(o.start..self.pos, "quasiform"));
                    }
                    let span = o.start..self.pos;
                    let array = self.alloc_array(heap, o.cells, span.clone())?;
                    let cell = Cell::array(o.heart, array);
                    let cell = if o.quasi {
                        cell.quasify().map_err(construct(span.clone()))?
                    } else {
                        cell
                    };
                    cell.quotify(heap, o.quotes).map_err(construct(span))?
                }
                _ => {
                    let atom = self.scan_atom(heap, symbols)?;
                    atom.quotify(heap, quotes).map_err(construct(start..self.pos))?
                }
            };

            match open.last_mut() {
                Some(o) => o.cells.push(cell),
                None => return Ok(Some(cell)),
            }
        }
    }

    /// Manage every array scanned
    pub fn finish(self, heap: &mut Heap) -> Result<(), ScanError> {
        let end = self.pos;
        for id in self.arrays {
            heap.manage(id).map_err(construct(end..end))?;
        }
        Ok(())
    }

    fn alloc_array(
        &mut self,
        heap: &mut Heap,
        cells: Vec<Cell>,
        span: Range<usize>,
    ) -> Result<StubId, ScanError> {
        let id = heap
            .alloc_flex(Flavor::Source, Flex::Cells(cells))
            .map_err(construct(span))?;
        self.arrays.push(id);
        Ok(id)
    }

    /// A value that is not an array
    fn scan_atom(
        &mut self,
        heap: &mut Heap,
        symbols: &mut SymbolTable,
    ) -> Result<Cell, ScanError> {
        let start = self.pos;
        let c = self.peek().ok_or(ScanError::Unterminated(start..start, "value"))?;
        let next = self.peek_second();

        match c {
            '"' => {
                self.bump();
                let text = self.scan_string(start)?;
                make_text(heap, &text).map_err(construct(start..self.pos))
            }
            '#' if next == Some('{') => {
                self.bump();
                self.bump();
                let close = self
                    .rest()
                    .find('}')
                    .ok_or(ScanError::Unterminated(start..self.text.len(), "binary"))?;
                let digits = &self.rest()[..close];
                self.pos += close + 1;
                let bytes = parse_hex(digits)
                    .ok_or_else(|| ScanError::BadHex(start..self.pos, digits.to_string()))?;
                let blob = heap
                    .alloc_flex(Flavor::Blob, Flex::Bytes(bytes))
                    .map_err(construct(start..self.pos))?;
                heap.manage(blob).map_err(construct(start..self.pos))?;
                Ok(Cell::blob(blob))
            }
            '#' if next == Some('"') => {
                self.bump();
                self.bump();
                let text = self.scan_string(start)?;
                let mut chars = text.chars();
                match (chars.next(), chars.next()) {
                    (Some(ch), None) => Ok(Cell::rune(ch)),
                    _ => Err(ScanError::Unexpected(start..self.pos, '#')),
                }
            }
            '_' if next.map_or(true, is_delimiter) => {
                self.bump();
                Ok(Cell::space())
            }
            '~' if next.map_or(true, is_delimiter) => {
                self.bump();
                Ok(Cell::quasi_space())
            }
            '~' => {
                self.bump();
                let word = self.scan_word(heap, symbols)?;
                if self.bump() != Some('~') {
                    return Err(ScanError::Unterminated(start..self.pos, "quasiform"));
                }
                word.quasify().map_err(construct(start..self.pos))
            }
            ',' => {
                self.bump();
                Ok(Cell::comma())
            }
            ':' | '^' => {
                self.bump();
                let sigil = if c == ':' { Sigil::Get } else { Sigil::Meta };
                match self.scan_word(heap, symbols)? {
                    w if w.heart() == Heart::Word => Ok(w.with_sigil(sigil)),
                    _ => Err(ScanError::Unexpected(start..self.pos, c)),
                }
            }
            c if c.is_ascii_digit() => self.scan_number(),
            '+' | '-' if next.map_or(false, |n| n.is_ascii_digit()) => self.scan_number(),
            c if self.rest().starts_with("make") && self.is_bitset_construction() => {
                let (bitset, used) = Bitset::parse_prefix(self.rest())
                    .map_err(|_| ScanError::BadBitset(start..start + c.len_utf8()))?;
                self.pos += used;
                let stub = bitset.to_stub(heap).map_err(construct(start..self.pos))?;
                Ok(Cell::bitset(stub))
            }
            c if is_word_start(c) => {
                let word = self.scan_word(heap, symbols)?;
                if word.heart() == Heart::Word && self.peek() == Some(':') {
                    self.bump();
                    return Ok(word.with_sigil(Sigil::Set));
                }
                Ok(word)
            }
            c => Err(ScanError::Unexpected(start..start + c.len_utf8(), c)),
        }
    }

    /// `make bitset!` introduces a bitset in its canonical form
    fn is_bitset_construction(&self) -> bool {
        let after = self.rest()["make".len()..].trim_start();
        after.starts_with("bitset!") && self.rest()["make".len()..].starts_with(char::is_whitespace)
    }

    /// Body of a string after its opening quote, decoding `^` escapes
    fn scan_string(&mut self, start: usize) -> Result<String, ScanError> {
        let mut out = String::new();
        loop {
            match self.bump() {
                None => return Err(ScanError::Unterminated(start..self.pos, "string")),
                Some('"') => return Ok(out),
                Some('^') => match self.bump() {
                    Some('/') => out.push('\n'),
                    Some('-') => out.push('\t'),
                    Some('"') => out.push('"'),
                    Some('^') => out.push('^'),
                    Some(c) => return Err(ScanError::Unexpected(self.pos - c.len_utf8()..self.pos, c)),
                    None => return Err(ScanError::Unterminated(start..self.pos, "string")),
                },
                Some(c) => out.push(c),
            }
        }
    }

    fn scan_number(&mut self) -> Result<Cell, ScanError> {
        let start = self.pos;
        if matches!(self.peek(), Some('+') | Some('-')) {
            self.bump();
        }
        let mut decimal = false;
        while let Some(c) = self.peek() {
            if c.is_ascii_digit() {
                self.bump();
            } else if c == '.' && !decimal && self.peek_second().map_or(false, |n| n.is_ascii_digit()) {
                decimal = true;
                self.bump();
            } else {
                break;
            }
        }
        if !self.at_delimiter() && !matches!(self.peek(), Some('.') | Some('/')) {
            while !self.at_delimiter() {
                self.bump();
            }
            return Err(ScanError::BadNumber(
                start..self.pos,
                self.text[start..self.pos].to_string(),
            ));
        }

        let lexeme = &self.text[start..self.pos];
        let bad = || ScanError::BadNumber(start..self.pos, lexeme.to_string());
        if decimal {
            lexeme.parse::<f64>().map(Cell::decimal).map_err(|_| bad())
        } else {
            lexeme.parse::<i64>().map(Cell::integer).map_err(|_| bad())
        }
    }

    /// An integer segment of a path or tuple; a `.` after the digits
    /// always separates
    fn scan_index(&mut self) -> Result<Cell, ScanError> {
        let start = self.pos;
        while self.peek().map_or(false, |c| c.is_ascii_digit()) {
            self.bump();
        }
        if !self.at_delimiter() && !matches!(self.peek(), Some('.') | Some('/')) {
            while !self.at_delimiter() {
                self.bump();
            }
            return Err(ScanError::BadNumber(
                start..self.pos,
                self.text[start..self.pos].to_string(),
            ));
        }
        let lexeme = &self.text[start..self.pos];
        lexeme
            .parse::<i64>()
            .map(Cell::integer)
            .map_err(|_| ScanError::BadNumber(start..self.pos, lexeme.to_string()))
    }

    /// A word, or a path or tuple of words and integers
    fn scan_word(
        &mut self,
        heap: &mut Heap,
        symbols: &mut SymbolTable,
    ) -> Result<Cell, ScanError> {
        let start = self.pos;
        let first = self.scan_name(symbols)?;

        let separator = match self.peek() {
            Some(sep @ ('.' | '/')) if self.peek_second().map_or(false, |n| is_word_char(n)) => {
                sep
            }
            _ => return Ok(first),
        };

        let mut segments = vec![first];
        while self.peek() == Some(separator) {
            self.bump();
            let segment = match self.peek() {
                Some(d) if d.is_ascii_digit() => self.scan_index()?,
                Some(c) if is_word_start(c) => self.scan_name(symbols)?,
                Some(c) => return Err(ScanError::Unexpected(self.pos..self.pos + c.len_utf8(), c)),
                None => return Err(ScanError::Unterminated(start..self.pos, "path")),
            };
            segments.push(segment);
        }

        let heart = if separator == '.' {
            Heart::Tuple
        } else {
            Heart::Path
        };
        let array = self.alloc_array(heap, segments, start..self.pos)?;
        Ok(Cell::array(heart, array))
    }

    fn scan_name(&mut self, symbols: &mut SymbolTable) -> Result<Cell, ScanError> {
        let start = self.pos;
        match self.peek() {
            Some(c) if is_word_start(c) => {}
            Some(c) => return Err(ScanError::Unexpected(start..start + c.len_utf8(), c)),
            None => return Err(ScanError::Unterminated(start..start, "word")),
        }
        while self.peek().map_or(false, is_word_char) {
            self.bump();
        }
        Ok(Cell::word(symbols.intern(&self.text[start..self.pos])))
    }
}

fn construct(span: Range<usize>) -> impl FnOnce(ExecutionError) -> ScanError {
    move |e| ScanError::Construct(span, e.to_string())
}

#[cfg(test)]
pub mod tests {
    use super::*;
    use crate::eval::memory::cell::Kind;

    fn scan(text: &str) -> (Heap, SymbolTable, Vec<Cell>) {
        let mut heap = Heap::new();
        let mut symbols = SymbolTable::new();
        let block = transcode(&mut heap, &mut symbols, text).unwrap();
        let cells = heap.cells(block).unwrap().to_vec();
        (heap, symbols, cells)
    }

    #[test]
    pub fn test_scalars() {
        let (_, _, cells) = scan("1 -2 3.5 _ , ~");
        assert_eq!(cells[0], Cell::integer(1));
        assert_eq!(cells[1], Cell::integer(-2));
        assert_eq!(cells[2], Cell::decimal(3.5));
        assert_eq!(cells[3], Cell::space());
        assert_eq!(cells[4], Cell::comma());
        assert_eq!(cells[5], Cell::quasi_space());
    }

    #[test]
    pub fn test_words_and_sigils() {
        let (_, symbols, cells) = scan("foo bar: :baz ^qux equal?");
        let sigils: Vec<_> = cells.iter().map(|c| c.sigil().unwrap()).collect();
        assert_eq!(
            sigils,
            vec![Sigil::None, Sigil::Set, Sigil::Get, Sigil::Meta, Sigil::None]
        );
        assert_eq!(symbols.resolve(cells[4].symbol().unwrap()), "equal?");
    }

    #[test]
    pub fn test_nesting_and_quotes() {
        let (heap, _, cells) = scan("[a (b) 'c] ''[x] ~[1 2]~ ~null~");
        assert_eq!(cells.len(), 4);
        let (inner, _) = cells[0].series().unwrap();
        let inner = heap.cells(inner).unwrap();
        assert_eq!(inner.len(), 3);
        assert_eq!(inner[1].heart(), Heart::Group);
        assert_eq!(inner[2].quote_depth(), 1);
        assert_eq!(cells[1].quote_depth(), 2);
        assert_eq!(cells[2].kind(), Kind::Quasi);
        assert_eq!(cells[3].kind(), Kind::Quasi);
    }

    #[test]
    pub fn test_paths_and_tuples() {
        let (heap, _, cells) = scan("a.b a/b/1");
        assert_eq!(cells[0].heart(), Heart::Tuple);
        assert_eq!(cells[1].heart(), Heart::Path);
        let (path, _) = cells[1].series().unwrap();
        assert_eq!(heap.cells(path).unwrap()[2], Cell::integer(1));
    }

    #[test]
    pub fn test_tuple_segments_are_integers() {
        let (heap, _, cells) = scan("a.1.2 b/3/4");
        let (tuple, _) = cells[0].series().unwrap();
        let segments = heap.cells(tuple).unwrap();
        assert_eq!(segments.len(), 3);
        assert_eq!(segments[0].heart(), Heart::Word);
        assert_eq!(segments[1], Cell::integer(1));
        assert_eq!(segments[2], Cell::integer(2));

        let (path, _) = cells[1].series().unwrap();
        let segments = heap.cells(path).unwrap();
        assert_eq!(segments.len(), 3);
        assert_eq!(segments[2], Cell::integer(4));
    }

    #[test]
    pub fn test_strings_and_binaries() {
        let (heap, _, cells) = scan(r#""a^"b^/" #{DEAD} #"x" ; comment"#);
        assert_eq!(cells.len(), 3);
        let (text, _) = cells[0].series().unwrap();
        assert_eq!(heap.bytes(text).unwrap(), b"a\"b\n");
        let (blob, _) = cells[1].series().unwrap();
        assert_eq!(heap.bytes(blob).unwrap(), &[0xDE, 0xAD]);
        assert_eq!(cells[2], Cell::rune('x'));
    }

    #[test]
    pub fn test_bitset_literals() {
        let (heap, _, cells) = scan("make bitset! #{80} make bitset! [not bits #{40}]");
        assert_eq!(cells.len(), 2);
        let (a, _) = cells[0].series().unwrap();
        assert_eq!(Bitset::from_stub(&heap, a).unwrap().mold(), "make bitset! #{80}");
        let (b, _) = cells[1].series().unwrap();
        assert!(Bitset::from_stub(&heap, b).unwrap().is_negated());
    }

    #[test]
    pub fn test_errors_carry_spans() {
        let mut heap = Heap::new();
        let mut symbols = SymbolTable::new();
        let live = heap.stats().live;

        let err = transcode(&mut heap, &mut symbols, "[a [b]").unwrap_err();
        assert_eq!(err, ScanError::Unterminated(0..6, "array"));
        assert_eq!(heap.stats().live, live);

        let err = transcode(&mut heap, &mut symbols, "a ]").unwrap_err();
        assert_eq!(err.span(), 2..3);

        let err = transcode(&mut heap, &mut symbols, "12ab").unwrap_err();
        assert!(matches!(err, ScanError::BadNumber(_, _)));
    }
}

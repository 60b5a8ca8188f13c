//! Applies a native contraction table to text.
//!
//! At each input position the engine picks the first qualifying rule from the
//! two-character bucket (rules of two or more characters, longest first),
//! then from the one-character bucket, and otherwise falls back to the
//! character's own cell. Capital and number indicator signs are inserted as
//! the text moves in and out of capitalized runs and numbers.
use std::ops::Range;

use crate::classify::{classify, to_lower, Case};
use crate::types::{CharacterAttributes, Dots, BLANK_CELL};

use super::layout::{hash, NativeTable, RuleRef};
use super::opcode::Opcode;
use super::session::{CapitalizationState, Translation, TranslationSession, TranslationStatus};

const SPACE: CharacterAttributes = CharacterAttributes::SPACE;

pub(crate) fn translate(
    table: &NativeTable,
    session: &mut TranslationSession,
    text: &str,
) -> Translation {
    let input: Vec<char> = text.chars().collect();
    let mut engine = Engine::new(table, session, &input);
    let translation = engine.run();
    session.capitalization = engine.state.capitalization;

    log::trace!(
        "translated {} of {} characters into {} cells",
        translation.consumed,
        input.len(),
        translation.cells.len()
    );
    translation
}

/// The word under the cursor, if the cursor is on one.
fn current_word(attributes: &[CharacterAttributes], cursor: usize) -> Option<Range<usize>> {
    if attributes.get(cursor)?.contains(SPACE) {
        return None;
    }

    let start = attributes[..cursor]
        .iter()
        .rposition(|a| a.contains(SPACE))
        .map_or(0, |i| i + 1);
    let end = attributes[cursor..]
        .iter()
        .position(|a| a.contains(SPACE))
        .map_or(attributes.len(), |i| cursor + i);

    Some(start..end)
}

#[derive(Debug, Clone, Copy)]
struct State {
    capitalization: CapitalizationState,
    number_mode: bool,
    previous: Option<Opcode>,
    /// Cell count right after a whole-word large sign, while only blanks follow.
    join_from: Option<usize>,
}

struct Engine<'a> {
    table: &'a NativeTable,
    input: &'a [char],
    attributes: Vec<CharacterAttributes>,
    expanded: Option<Range<usize>>,
    capacity: usize,
    capitals: bool,
    cells: Vec<Dots>,
    offsets: Vec<usize>,
    state: State,
    /// Cells dropped by a large sign join in the current step.
    joined: Option<(usize, Vec<Dots>, Vec<usize>)>,
}

impl<'a> Engine<'a> {
    fn new(table: &'a NativeTable, session: &TranslationSession, input: &'a [char]) -> Engine<'a> {
        let attributes: Vec<CharacterAttributes> = input
            .iter()
            .map(|&c| {
                table
                    .character(c)
                    .map(|entry| entry.attributes)
                    .unwrap_or_else(|| classify(c))
            })
            .collect();

        let expanded = match (session.expand_current_word, session.cursor) {
            (true, Some(cursor)) => current_word(&attributes, cursor),
            _ => None,
        };

        let capitals = [
            Opcode::CapitalSign,
            Opcode::BeginCapitalSign,
            Opcode::EndCapitalSign,
        ]
        .iter()
        .any(|&sign| table.sign(sign).is_some());

        Engine {
            table,
            input,
            attributes,
            expanded,
            capacity: session.capacity,
            capitals,
            cells: Vec::with_capacity(input.len().min(session.capacity)),
            offsets: Vec::with_capacity(input.len().min(session.capacity)),
            state: State {
                capitalization: session.capitalization,
                number_mode: false,
                previous: None,
                join_from: None,
            },
            joined: None,
        }
    }

    fn run(&mut self) -> Translation {
        let mut position = 0;
        let mut status = TranslationStatus::Complete;

        while position < self.input.len() {
            let checkpoint = (self.cells.len(), self.state);
            self.joined = None;

            let advance = self.step(position);

            if self.cells.len() > self.capacity {
                self.rollback(checkpoint);
                status = TranslationStatus::BufferFull;
                break;
            }
            position += advance;
        }

        Translation {
            cells: std::mem::take(&mut self.cells),
            offsets: std::mem::take(&mut self.offsets),
            consumed: position,
            status,
        }
    }

    fn rollback(&mut self, (len, state): (usize, State)) {
        if let Some((at, cells, offsets)) = self.joined.take() {
            self.cells.truncate(at);
            self.offsets.truncate(at);
            self.cells.extend(cells);
            self.offsets.extend(offsets);
        }
        self.cells.truncate(len);
        self.offsets.truncate(len);
        self.state = state;
    }

    fn step(&mut self, p: usize) -> usize {
        let pending_join = self.state.join_from.take();

        let advance = match self.select(p) {
            Some(rule) => self.apply(p, rule, pending_join),
            None => {
                self.fallback(p);
                1
            }
        };

        let blanks = self.attributes[p..p + advance]
            .iter()
            .all(|a| a.contains(SPACE));
        if blanks && self.state.join_from.is_none() {
            self.state.join_from = pending_join;
        }

        advance
    }

    fn select(&self, p: usize) -> Option<RuleRef<'a>> {
        let table = self.table;
        let first = to_lower(self.input[p]);

        if let Some(&second) = self.input.get(p + 1) {
            let found = table
                .chain(hash(first, to_lower(second)))
                .find(|rule| rule.find_len() >= 2 && self.qualifies(p, rule));
            if found.is_some() {
                return found;
            }
        }

        table
            .chain(hash(first, '\0'))
            .find(|rule| rule.find_len() == 1 && self.qualifies(p, rule))
    }

    #[inline(always)]
    fn attributes_at(&self, index: usize) -> CharacterAttributes {
        self.attributes.get(index).copied().unwrap_or(SPACE)
    }

    #[inline(always)]
    fn attributes_before(&self, index: usize) -> CharacterAttributes {
        match index {
            0 => SPACE,
            i => self.attributes_at(i - 1),
        }
    }

    fn matches_at(&self, p: usize, rule: &RuleRef<'_>) -> bool {
        let end = p + rule.find_len();
        end <= self.input.len()
            && rule
                .find()
                .zip(&self.input[p..end])
                .all(|(f, &c)| f == to_lower(c))
    }

    fn qualifies(&self, p: usize, rule: &RuleRef<'_>) -> bool {
        let opcode = rule.opcode();
        if !opcode.is_matchable() || !self.matches_at(p, rule) {
            return false;
        }

        let len = rule.find_len();
        let end = p + len;

        if let Some(word) = &self.expanded {
            if len > 1 && p < word.end && end > word.start {
                return false;
            }
        }

        let prev = self.attributes_before(p);
        let next = self.attributes_at(end);

        if !rule.after().is_empty() && !prev.intersects(rule.after()) {
            return false;
        }
        if !rule.before().is_empty() && !next.intersects(rule.before()) {
            return false;
        }

        self.case_compatible(p, len) && self.position_allows(opcode, p, len, prev, next)
    }

    fn position_allows(
        &self,
        opcode: Opcode,
        p: usize,
        len: usize,
        prev: CharacterAttributes,
        next: CharacterAttributes,
    ) -> bool {
        use CharacterAttributes as A;

        let beg = prev.is_word_boundary();
        let end = next.is_word_boundary();
        let punctuation = || {
            self.attributes[p..p + len]
                .iter()
                .all(|a| a.contains(A::PUNCTUATION))
        };

        match opcode {
            Opcode::Literal
            | Opcode::Always
            | Opcode::Repeatable
            | Opcode::Replace
            | Opcode::LargeSign
            | Opcode::LastLargeSign => true,
            Opcode::WholeWord | Opcode::Contraction => beg && end,
            Opcode::LowWord => {
                prev.contains(SPACE)
                    && next.contains(SPACE)
                    && self.cells.last().map_or(true, |&c| c == BLANK_CELL)
                    && self.state.previous != Some(Opcode::JoinedWord)
            }
            Opcode::JoinedWord => {
                beg && next.contains(SPACE)
                    && self
                        .attributes
                        .get(p + len + 1)
                        .map_or(false, |a| a.contains(A::LETTER))
            }
            Opcode::SuffixableWord => beg,
            Opcode::PrefixableWord => end,
            Opcode::BegWord => beg && !end,
            Opcode::BegMidWord => !end,
            Opcode::MidWord => !beg && !end,
            Opcode::MidEndWord => !beg,
            Opcode::EndWord => !beg && end,
            Opcode::PrePunc => beg && !end && punctuation(),
            Opcode::PostPunc => !beg && end && punctuation(),
            Opcode::BegNum => beg && next.contains(A::DIGIT),
            Opcode::MidNum => prev.contains(A::DIGIT) && next.contains(A::DIGIT),
            Opcode::EndNum => prev.contains(A::DIGIT),
            _ => false,
        }
    }

    /// Capital sign owed by character `index`, and the state after it.
    fn case_step(
        &self,
        state: CapitalizationState,
        index: usize,
    ) -> (Option<Opcode>, CapitalizationState) {
        use CapitalizationState::*;

        let attributes = self.attributes[index];
        match Case::new(attributes) {
            Case::Upper if state == BlockOpen => (None, BlockOpen),
            Case::Upper => {
                let next_upper = self
                    .attributes
                    .get(index + 1)
                    .map_or(false, |a| a.contains(CharacterAttributes::UPPERCASE));
                if next_upper && self.table.sign(Opcode::BeginCapitalSign).is_some() {
                    (Some(Opcode::BeginCapitalSign), BlockOpen)
                } else {
                    (Some(Opcode::CapitalSign), SinglePending)
                }
            }
            Case::Lower if state == BlockOpen => (Some(Opcode::EndCapitalSign), Off),
            Case::Lower => (None, Off),
            Case::Neither if attributes.contains(CharacterAttributes::LETTER) => (None, state),
            Case::Neither => (None, Off),
        }
    }

    /// A multi-character match must not hide a capital sign after its first
    /// character.
    fn case_compatible(&self, p: usize, len: usize) -> bool {
        if !self.capitals || len < 2 {
            return true;
        }

        let (_, mut state) = self.case_step(self.state.capitalization, p);
        for index in p + 1..p + len {
            let (sign, next) = self.case_step(state, index);
            if sign.map_or(false, |sign| self.table.sign(sign).is_some()) {
                return false;
            }
            state = next;
        }
        true
    }

    #[inline(always)]
    fn push(&mut self, cell: Dots, offset: usize) {
        self.cells.push(cell);
        self.offsets.push(offset);
    }

    fn push_rule(&mut self, rule: RuleRef<'_>, offset: usize) {
        for cell in rule.cells() {
            self.push(cell, offset);
        }
    }

    fn push_sign(&mut self, sign: Opcode, offset: usize) {
        let table = self.table;
        if let Some(rule) = table.sign(sign) {
            self.push_rule(rule, offset);
        }
    }

    /// A character's own cell: its `always` rule, a blank, or its low byte.
    fn push_character(&mut self, ch: char, offset: usize) {
        let table = self.table;
        match table.character(ch).and_then(|entry| table.always(&entry)) {
            Some(rule) => self.push_rule(rule, offset),
            None if ch.is_whitespace() => self.push(BLANK_CELL, offset),
            None => self.push(ch as u32 as Dots, offset),
        }
    }

    /// Indicator signs owed before the output for character `p`.
    fn mark(&mut self, p: usize, opcode: Option<Opcode>) {
        let attributes = self.attributes[p];
        let numeric = matches!(
            opcode,
            Some(Opcode::BegNum) | Some(Opcode::MidNum) | Some(Opcode::EndNum)
        );

        if !numeric {
            if attributes.contains(CharacterAttributes::DIGIT) {
                if !self.state.number_mode {
                    self.push_sign(Opcode::NumberSign, p);
                }
            } else if attributes.contains(CharacterAttributes::LETTER) && self.state.number_mode {
                self.push_sign(Opcode::EnglishLetterSign, p);
            }
        }

        if self.capitals {
            let (sign, state) = self.case_step(self.state.capitalization, p);
            if let Some(sign) = sign {
                self.push_sign(sign, p);
            }
            self.state.capitalization = state;
        }
    }

    /// Carry mode state across the rest of a consumed span.
    fn settle(&mut self, p: usize, end: usize, opcode: Option<Opcode>) {
        self.state.number_mode = match opcode {
            Some(Opcode::BegNum) | Some(Opcode::MidNum) => true,
            Some(Opcode::EndNum) => false,
            _ => self.attributes[end - 1].contains(CharacterAttributes::DIGIT),
        };

        if self.capitals {
            for index in p + 1..end {
                let (_, state) = self.case_step(self.state.capitalization, index);
                self.state.capitalization = state;
            }
        }
    }

    fn fallback(&mut self, p: usize) {
        self.mark(p, None);
        self.push_character(self.input[p], p);
        self.settle(p, p + 1, None);
        self.state.previous = None;
    }

    /// Drop the blanks emitted since the previous large sign.
    fn join(&mut self, at: usize) {
        if at > self.cells.len() {
            return;
        }

        let cells = self.cells.split_off(at);
        let offsets = self.offsets.split_off(at);
        for (&cell, &offset) in cells.iter().zip(&offsets) {
            if cell != BLANK_CELL {
                self.push(cell, offset);
            }
        }
        self.joined = Some((at, cells, offsets));
    }

    fn apply(&mut self, p: usize, rule: RuleRef<'a>, pending_join: Option<usize>) -> usize {
        let opcode = rule.opcode();
        let len = rule.find_len();
        let end = p + len;
        let whole_word =
            self.attributes_before(p).is_word_boundary() && self.attributes_at(end).is_word_boundary();

        if matches!(opcode, Opcode::LargeSign | Opcode::LastLargeSign) && whole_word {
            if let Some(at) = pending_join {
                self.join(at);
            }
        }

        self.mark(p, Some(opcode));

        let advance = match opcode {
            Opcode::Literal => {
                let word_end = self.attributes[end..]
                    .iter()
                    .position(|a| a.contains(SPACE))
                    .map_or(self.input.len(), |i| end + i);

                for index in p..word_end {
                    if index > p {
                        self.mark(index, None);
                    }
                    self.push_character(self.input[index], index);
                    self.settle(index, index + 1, None);
                }

                self.state.previous = Some(opcode);
                return word_end - p;
            }
            Opcode::Contraction => {
                self.push_sign(Opcode::EnglishLetterSign, p);
                for index in p..end {
                    self.push_character(self.input[index], index);
                }
                len
            }
            Opcode::Replace => {
                for ch in rule.replacement() {
                    self.push_character(ch, p);
                }
                len
            }
            Opcode::Repeatable => {
                self.push_rule(rule, p);
                let mut next = end;
                while self.matches_at(next, &rule) {
                    next += len;
                }
                next - p
            }
            Opcode::JoinedWord => {
                self.push_rule(rule, p);
                len + 1
            }
            _ => {
                self.push_rule(rule, p);
                len
            }
        };

        self.settle(p, p + advance, Some(opcode));
        self.state.previous = Some(opcode);
        self.state.join_from = match opcode {
            Opcode::LargeSign if whole_word => Some(self.cells.len()),
            _ => None,
        };

        advance
    }
}

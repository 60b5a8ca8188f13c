//! Contraction table compiler: `.ctb` source to a [`NativeTable`] blob.
use std::path::Path;

use hashbrown::HashMap;
use itertools::Itertools;
use smol_str::SmolStr;

use crate::arena::{ArenaError, DataArena};
use crate::classify::{case_pair, classify, to_lower};
use crate::constants::{
    CHARACTER_ENTRY_SIZE, CONTRACTION_MAGIC, CONTRACTION_VERSION, DATA_ALIGNMENT, HEADER_SIZE,
    MAX_FIND_LENGTH, MAX_REPLACE_LENGTH, OFFSET_SIZE, RULE_HEADER_SIZE, RULE_UNIT_SIZE,
    SIGN_COUNT,
};
use crate::datafile::{
    parse_text, Compiled, DataFileReader, DiagnosticKind, Directive, DirectiveError,
    DirectiveHandler,
};
use crate::error::TableError;
use crate::paths::TableKind;
use crate::types::{CharacterAttributes, DataOffset, Dots, BLANK_CELL};
use crate::vfs::Filesystem;

use super::layout::{
    hash, NativeTable, TableBytes, BUCKETS_AT, CHARACTERS_AT, CHARACTER_COUNT_AT, ENTRY_ALWAYS,
    ENTRY_ATTRIBUTES, ENTRY_LOWER, ENTRY_UPPER, ENTRY_VALUE, RULE_AFTER, RULE_BEFORE,
    RULE_FIND_LEN, RULE_NEXT, RULE_OPCODE, RULE_REPLACE_LEN, SIGNS_AT, VERSION_AT,
};
use super::opcode::Opcode;

#[derive(Debug)]
struct PendingRule {
    opcode: Opcode,
    find: Vec<char>,
    replacement: Vec<u32>,
    after: CharacterAttributes,
    before: CharacterAttributes,
}

impl PendingRule {
    fn bucket(&self) -> usize {
        match self.find.as_slice() {
            [first] => hash(*first, '\0'),
            [first, second, ..] => hash(*first, *second),
            [] => 0,
        }
    }

    fn is_plain_always(&self) -> bool {
        self.opcode == Opcode::Always
            && self.find.len() == 1
            && self.after.is_empty()
            && self.before.is_empty()
    }
}

/// Collects the directives of a contraction table source.
#[derive(Debug, Default)]
pub struct ContractionCompiler {
    rules: Vec<PendingRule>,
    signs: [Option<Vec<Dots>>; SIGN_COUNT],
    classes: HashMap<SmolStr, CharacterAttributes>,
    characters: HashMap<char, CharacterAttributes>,
}

impl ContractionCompiler {
    pub fn new() -> ContractionCompiler {
        ContractionCompiler::default()
    }

    pub fn rule_count(&self) -> usize {
        self.rules.len()
    }

    fn class(&self, name: &str) -> Result<CharacterAttributes, DiagnosticKind> {
        CharacterAttributes::BUILTIN_CLASSES
            .iter()
            .find(|(builtin, _)| *builtin == name)
            .map(|(_, attributes)| *attributes)
            .or_else(|| self.classes.get(name).copied())
            .ok_or_else(|| DiagnosticKind::unknown(name))
    }

    fn add_character(&mut self, ch: char, extra: CharacterAttributes) {
        let (upper, lower) = case_pair(ch);
        for c in [ch, upper, lower] {
            *self.characters.entry(c).or_default() |= extra;
        }
    }

    fn define_class(&mut self, name: &str, members: &[char]) -> Result<(), DiagnosticKind> {
        if CharacterAttributes::BUILTIN_CLASSES
            .iter()
            .any(|(builtin, _)| *builtin == name)
        {
            return Err(DiagnosticKind::syntax(format!(
                "cannot redefine built-in class `{}`",
                name
            )));
        }

        let bits = match self.classes.get(name) {
            Some(bits) => *bits,
            None => {
                let bits = CharacterAttributes::user_class(self.classes.len() as u32)
                    .ok_or_else(|| DiagnosticKind::syntax("too many character classes"))?;
                self.classes.insert(name.into(), bits);
                bits
            }
        };

        for &ch in members {
            self.add_character(ch, bits);
        }
        Ok(())
    }

    fn push_rule(
        &mut self,
        opcode: Opcode,
        find: Vec<char>,
        replacement: Vec<u32>,
        after: CharacterAttributes,
        before: CharacterAttributes,
    ) {
        for &ch in &find {
            self.add_character(ch, CharacterAttributes::empty());
        }
        self.rules.push(PendingRule {
            opcode,
            find,
            replacement,
            after,
            before,
        });
    }

    fn parse(&mut self, directive: &mut Directive<'_>) -> Result<(), DiagnosticKind> {
        let mut keyword = directive.keyword();
        let mut after = CharacterAttributes::empty();
        let mut before = CharacterAttributes::empty();

        let opcode = loop {
            let opcode = Opcode::from_keyword(keyword).ok_or_else(|| {
                DiagnosticKind::syntax(format!("unknown directive `{}`", keyword))
            })?;

            match opcode {
                Opcode::After => after |= self.class(directive.require_operand("class name")?)?,
                Opcode::Before => before |= self.class(directive.require_operand("class name")?)?,
                other => break other,
            }
            keyword = directive.require_operand("directive")?;
        };

        let constrained = !after.is_empty() || !before.is_empty();
        if constrained && !opcode.is_matchable() {
            return Err(DiagnosticKind::syntax(format!(
                "`{}` does not take class constraints",
                opcode
            )));
        }

        if let Some(index) = opcode.sign_index() {
            let cells = parse_dots(directive.require_operand("dots")?)?;
            directive.finish()?;
            self.signs[index] = Some(cells);
            return Ok(());
        }

        match opcode {
            Opcode::Class => {
                let name = directive.require_operand("class name")?;
                let members = parse_text(directive.require_operand("class characters")?)?;
                directive.finish()?;
                self.define_class(name, &members)
            }
            Opcode::Literal | Opcode::Contraction => {
                let find = parse_find(directive.require_operand("find text")?)?;
                directive.finish()?;
                self.push_rule(opcode, find, vec![], after, before);
                Ok(())
            }
            Opcode::Replace => {
                let find = parse_find(directive.require_operand("find text")?)?;
                let replacement = match directive.next_operand() {
                    Some(text) => parse_text(text)?,
                    None => vec![],
                };
                directive.finish()?;
                if replacement.len() > MAX_REPLACE_LENGTH {
                    return Err(DiagnosticKind::syntax("replacement text too long"));
                }
                let replacement = replacement.into_iter().map(u32::from).collect();
                self.push_rule(opcode, find, replacement, after, before);
                Ok(())
            }
            op if op.takes_dots() => {
                let find = parse_find(directive.require_operand("find text")?)?;
                let cells = parse_dots(directive.require_operand("dots")?)?;
                directive.finish()?;
                let cells = cells.into_iter().map(u32::from).collect();
                self.push_rule(opcode, find, cells, after, before);
                Ok(())
            }
            op => Err(DiagnosticKind::syntax(format!("misplaced `{}`", op))),
        }
    }

    /// Lay the collected rules out in a fresh arena.
    pub fn finish(self, arena_limit: Option<usize>) -> Result<NativeTable, TableError> {
        let mut arena = DataArena::with_limit(arena_limit);
        let header = arena.allocate(HEADER_SIZE, DATA_ALIGNMENT)?;
        arena
            .bytes_mut(header, CONTRACTION_MAGIC.len())
            .copy_from_slice(&CONTRACTION_MAGIC);
        arena.write_u32(header, VERSION_AT, CONTRACTION_VERSION);

        for (index, sign) in self.signs.iter().enumerate() {
            if let Some(cells) = sign {
                let rule = PendingRule {
                    opcode: Opcode::SIGNS[index],
                    find: vec![],
                    replacement: cells.iter().map(|&c| u32::from(c)).collect(),
                    after: CharacterAttributes::empty(),
                    before: CharacterAttributes::empty(),
                };
                let offset = write_rule(&mut arena, &rule)?;
                arena.write_u32(header, SIGNS_AT + index * OFFSET_SIZE, offset.get());
            }
        }

        let mut always: HashMap<char, DataOffset> = HashMap::new();
        for rule in &self.rules {
            let offset = write_rule(&mut arena, rule)?;
            link(&mut arena, header, rule, offset);
            if rule.is_plain_always() {
                always.entry(rule.find[0]).or_insert(offset);
            }
        }

        let characters: Vec<(char, CharacterAttributes)> = self
            .characters
            .into_iter()
            .sorted_by_key(|(ch, _)| *ch)
            .collect();

        let table = arena.allocate(characters.len() * CHARACTER_ENTRY_SIZE, DATA_ALIGNMENT)?;
        for (index, (ch, extra)) in characters.iter().enumerate() {
            let at = index * CHARACTER_ENTRY_SIZE;
            let (upper, lower) = case_pair(*ch);
            let always = always.get(&to_lower(*ch)).copied().unwrap_or(DataOffset::NONE);

            arena.write_u32(table, at + ENTRY_VALUE, *ch as u32);
            arena.write_u32(table, at + ENTRY_UPPER, upper as u32);
            arena.write_u32(table, at + ENTRY_LOWER, lower as u32);
            arena.write_u32(table, at + ENTRY_ATTRIBUTES, (classify(*ch) | *extra).bits());
            arena.write_u32(table, at + ENTRY_ALWAYS, always.get());
        }
        arena.write_u32(header, CHARACTERS_AT, table.get());
        arena.write_u32(header, CHARACTER_COUNT_AT, characters.len() as u32);

        let bytes = arena.finish();
        Ok(NativeTable::from_bytes(TableBytes::Owned(bytes))?)
    }
}

impl DirectiveHandler for ContractionCompiler {
    fn handle(&mut self, directive: &mut Directive<'_>) -> Result<(), DirectiveError> {
        self.parse(directive).map_err(DirectiveError::from)
    }
}

fn write_rule(arena: &mut DataArena, rule: &PendingRule) -> Result<DataOffset, ArenaError> {
    let units = rule.find.len() + rule.replacement.len();
    let offset = arena.allocate(RULE_HEADER_SIZE + units * RULE_UNIT_SIZE, DATA_ALIGNMENT)?;

    arena.write_u32(offset, RULE_AFTER, rule.after.bits());
    arena.write_u32(offset, RULE_BEFORE, rule.before.bits());
    arena.write_u8(offset, RULE_OPCODE, rule.opcode as u8);
    arena.write_u8(offset, RULE_FIND_LEN, rule.find.len() as u8);
    arena.write_u8(offset, RULE_REPLACE_LEN, rule.replacement.len() as u8);

    let text = rule.find.iter().map(|&c| c as u32).chain(rule.replacement.iter().copied());
    for (index, unit) in text.enumerate() {
        arena.write_u32(offset, RULE_HEADER_SIZE + index * RULE_UNIT_SIZE, unit);
    }

    Ok(offset)
}

/// Insert a rule into its bucket chain: longer find texts first, and at
/// equal length `always` rules after every other kind.
fn link(arena: &mut DataArena, header: DataOffset, rule: &PendingRule, offset: DataOffset) {
    let len = rule.find.len() as u8;
    let is_always = rule.opcode == Opcode::Always;

    let (mut owner, mut field) = (header, BUCKETS_AT + rule.bucket() * OFFSET_SIZE);
    let next = loop {
        let current = DataOffset::new(arena.read_u32(owner, field));
        let current = match current.non_empty() {
            Some(v) => v,
            None => break DataOffset::NONE,
        };

        let record = arena.bytes(current, RULE_HEADER_SIZE);
        let current_len = record[RULE_FIND_LEN];
        let current_is_always = record[RULE_OPCODE] == Opcode::Always as u8;

        if len > current_len || (len == current_len && !is_always && current_is_always) {
            break current;
        }

        owner = current;
        field = RULE_NEXT;
    };

    arena.write_u32(offset, RULE_NEXT, next.get());
    arena.write_u32(owner, field, offset.get());
}

fn parse_find(operand: &str) -> Result<Vec<char>, DiagnosticKind> {
    let find: Vec<char> = parse_text(operand)?.into_iter().map(to_lower).collect();
    if find.len() > MAX_FIND_LENGTH {
        return Err(DiagnosticKind::syntax("find text too long"));
    }
    Ok(find)
}

/// `1-1256-0`: cells separated by `-`, each a set of dot digits or `0`.
pub fn parse_dots(operand: &str) -> Result<Vec<Dots>, DiagnosticKind> {
    let mut cells = vec![];

    for cell in operand.split('-') {
        if cell == "0" {
            cells.push(BLANK_CELL);
            continue;
        }
        if cell.is_empty() {
            return Err(DiagnosticKind::syntax(format!("empty cell in `{}`", operand)));
        }

        let mut dots: Dots = 0;
        for ch in cell.chars() {
            match ch.to_digit(10) {
                Some(dot @ 1..=8) => dots |= 1u8 << (dot - 1),
                _ => {
                    return Err(DiagnosticKind::syntax(format!(
                        "invalid dot `{}` in `{}`",
                        ch, operand
                    )))
                }
            }
        }
        cells.push(dots);
    }

    if cells.len() > MAX_REPLACE_LENGTH {
        return Err(DiagnosticKind::syntax("too many cells"));
    }

    Ok(cells)
}

/// Compile a contraction table source file.
pub fn compile_file<FS: Filesystem>(
    fs: &FS,
    path: &Path,
    arena_limit: Option<usize>,
) -> Result<Compiled<NativeTable>, TableError> {
    let mut compiler = ContractionCompiler::new();
    let diagnostics = DataFileReader::new(fs, TableKind::Contraction.include_extension())
        .process(path, &mut compiler)?;

    let rules = compiler.rule_count();
    let table = compiler.finish(arena_limit)?;
    log::debug!(
        "compiled contraction table {}: {} rules, {} bytes, {} diagnostics",
        path.display(),
        rules,
        table.size(),
        diagnostics.len()
    );

    Ok(Compiled { table, diagnostics })
}

#[cfg(test)]
pub(crate) fn compile_source(source: &str) -> Compiled<NativeTable> {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("test.ctb");
    std::fs::write(&path, source).unwrap();
    compile_file(&crate::vfs::Fs, &path, None).unwrap()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::contraction::layout::HASH_SIZE;
    use proptest::prelude::*;

    fn chain_of(table: &NativeTable, find: &str) -> Vec<(Opcode, String)> {
        let chars: Vec<char> = find.chars().collect();
        let bucket = hash(chars[0], chars.get(1).copied().unwrap_or('\0'));
        table
            .chain(bucket)
            .map(|r| (r.opcode(), r.find().collect()))
            .collect()
    }

    #[test]
    fn dots() {
        assert_eq!(parse_dots("1").unwrap(), vec![0b1]);
        assert_eq!(parse_dots("1-12-0").unwrap(), vec![0b1, 0b11, 0]);
        assert_eq!(parse_dots("12345678").unwrap(), vec![0xff]);
        assert_eq!(parse_dots("8").unwrap(), vec![0x80]);
        assert!(parse_dots("9").is_err());
        assert!(parse_dots("").is_err());
        assert!(parse_dots("1--2").is_err());
        assert!(parse_dots("1a").is_err());
        assert!(parse_dots("10").is_err());
    }

    #[test]
    fn chain_priority() {
        let table = compile_source(
            "always ab 1\n\
             word ab 12\n\
             always abc 123\n\
             begword ab 1234\n",
        )
        .table;

        assert_eq!(
            chain_of(&table, "ab"),
            vec![
                (Opcode::Always, "abc".into()),
                (Opcode::WholeWord, "ab".into()),
                (Opcode::BegWord, "ab".into()),
                (Opcode::Always, "ab".into()),
            ]
        );
    }

    #[test]
    fn find_text_is_lowercased() {
        let table = compile_source("always ThE 2346\n").table;
        assert_eq!(chain_of(&table, "th")[0].1, "the");
        assert!(table.character('T').is_some());
        assert!(table.character('t').is_some());
        assert!(table.character('E').is_some());
    }

    #[test]
    fn classes_and_constraints() {
        let compiled = compile_source(
            "class vowel aeiou\n\
             after vowel always x 1346\n\
             before digit after space always y 13456\n\
             after consonant always z 1356\n\
             class letter xyz\n\
             after vowel capsign 6\n",
        );

        assert_eq!(compiled.diagnostics.len(), 3);
        assert!(matches!(
            compiled.diagnostics[0].kind,
            DiagnosticKind::UnknownSymbol(_)
        ));
        assert!(matches!(compiled.diagnostics[1].kind, DiagnosticKind::Syntax(_)));
        assert!(matches!(compiled.diagnostics[2].kind, DiagnosticKind::Syntax(_)));

        let table = compiled.table;
        let vowel = CharacterAttributes::user_class(0).unwrap();

        let x = table.chain(hash('x', '\0')).next().unwrap();
        assert_eq!(x.after(), vowel);
        assert!(x.before().is_empty());

        let y = table.chain(hash('y', '\0')).next().unwrap();
        assert_eq!(y.after(), CharacterAttributes::SPACE);
        assert_eq!(y.before(), CharacterAttributes::DIGIT);

        assert!(table.character('e').unwrap().attributes.contains(vowel));
        assert!(table.character('E').unwrap().attributes.contains(vowel));
        assert!(!table.character('x').unwrap().attributes.contains(vowel));

        // A constrained `always` is not the character's fallback.
        assert!(table.character('x').unwrap().always.is_none());
        assert!(table.sign(Opcode::CapitalSign).is_none());
    }

    #[test]
    fn always_fallback_is_first_plain_rule() {
        let table = compile_source(
            "after letter always s 16\n\
             always s 234\n\
             always s 2346\n",
        )
        .table;

        let s = table.character('S').unwrap();
        let rule = table.always(&s).unwrap();
        assert_eq!(rule.cells().collect::<Vec<_>>(), vec![0b1110]);
    }

    #[test]
    fn directive_forms() {
        let compiled = compile_source(
            "numsign 3456\n\
             begcaps 6-6\n\
             replace \\u2014 --\n\
             replace \\xad\n\
             literal http://\n\
             contraction ab\n\
             bogus a 1\n\
             always a\n\
             always a 1 2\n\
             always\n",
        );

        assert_eq!(compiled.diagnostics.len(), 4);
        let table = compiled.table;
        assert_eq!(
            table.sign(Opcode::BeginCapitalSign).unwrap().cells().collect::<Vec<_>>(),
            vec![0b10_0000, 0b10_0000]
        );
        assert!(table.sign(Opcode::NumberSign).is_some());

        let dash = table.chain(hash('\u{2014}', '\0')).next().unwrap();
        assert_eq!(dash.opcode(), Opcode::Replace);
        assert_eq!(dash.replacement().collect::<String>(), "--");

        let shy = table.chain(hash('\u{ad}', '\0')).next().unwrap();
        assert_eq!(shy.replacement_len(), 0);

        assert_eq!(chain_of(&table, "ht")[0], (Opcode::Literal, "http://".into()));
        assert_eq!(chain_of(&table, "ab")[0], (Opcode::Contraction, "ab".into()));
    }

    #[test]
    fn limits() {
        let long = "a".repeat(MAX_FIND_LENGTH + 1);
        let compiled = compile_source(&format!(
            "always {} 1\nalways {} 1\n",
            long,
            &long[1..]
        ));
        assert_eq!(compiled.diagnostics.len(), 1);
        assert_eq!(compiled.table.stats().rules, 1);

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("t.ctb");
        std::fs::write(&path, "always a 1\n").unwrap();
        assert!(matches!(
            compile_file(&crate::vfs::Fs, &path, Some(HEADER_SIZE)),
            Err(TableError::OutOfMemory { .. })
        ));
    }

    #[test]
    fn deterministic() {
        let source = "class v aeiou\nalways the 2346\nword and 12346\nafter v always n 1345\n";
        let a = compile_source(source).table;
        let b = compile_source(source).table;
        assert_eq!(a.as_bytes(), b.as_bytes());
    }

    const OPCODES: [&str; 6] = ["always", "word", "begword", "endword", "midword", "largesign"];

    proptest! {
        #[test]
        fn every_rule_in_exactly_one_chain(
            rules in proptest::collection::vec(("[a-e]{1,4}", 0..OPCODES.len(), 1u8..=255), 0..64)
        ) {
            let mut source = String::new();
            for (find, opcode, dots) in &rules {
                let cell: String = (0..8)
                    .filter(|bit| dots & (1 << bit) != 0)
                    .map(|bit| char::from(b'1' + bit))
                    .collect();
                source.push_str(&format!("{} {} {}\n", OPCODES[*opcode], find, cell));
            }

            let compiled = compile_source(&source);
            prop_assert!(compiled.diagnostics.is_empty());
            let table = compiled.table;

            let mut seen = std::collections::HashSet::new();
            for bucket in 0..HASH_SIZE {
                let lengths: Vec<usize> = table.chain(bucket).map(|r| r.find_len()).collect();
                prop_assert!(lengths.windows(2).all(|w| w[0] >= w[1]));
                for rule in table.chain(bucket) {
                    prop_assert!(seen.insert(rule.offset()));
                    let find: Vec<char> = rule.find().collect();
                    let expected = hash(find[0], find.get(1).copied().unwrap_or('\0'));
                    prop_assert_eq!(bucket, expected);
                }
            }
            prop_assert_eq!(seen.len(), rules.len());
        }
    }
}

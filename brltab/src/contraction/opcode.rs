//! Rule kinds of a contraction table.

/// What a rule does and where it may fire. Stored as one byte in each rule
/// record, so the discriminants are part of the persisted format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[repr(u8)]
pub enum Opcode {
    CapitalSign = 0,
    BeginCapitalSign,
    EndCapitalSign,
    EnglishLetterSign,
    NumberSign,
    Literal,
    Always,
    Repeatable,
    LargeSign,
    LastLargeSign,
    WholeWord,
    JoinedWord,
    LowWord,
    Contraction,
    SuffixableWord,
    PrefixableWord,
    BegWord,
    BegMidWord,
    MidWord,
    MidEndWord,
    EndWord,
    PrePunc,
    PostPunc,
    BegNum,
    MidNum,
    EndNum,
    Class,
    After,
    Before,
    Replace,
}

impl Opcode {
    pub const ALL: [Opcode; 30] = [
        Opcode::CapitalSign,
        Opcode::BeginCapitalSign,
        Opcode::EndCapitalSign,
        Opcode::EnglishLetterSign,
        Opcode::NumberSign,
        Opcode::Literal,
        Opcode::Always,
        Opcode::Repeatable,
        Opcode::LargeSign,
        Opcode::LastLargeSign,
        Opcode::WholeWord,
        Opcode::JoinedWord,
        Opcode::LowWord,
        Opcode::Contraction,
        Opcode::SuffixableWord,
        Opcode::PrefixableWord,
        Opcode::BegWord,
        Opcode::BegMidWord,
        Opcode::MidWord,
        Opcode::MidEndWord,
        Opcode::EndWord,
        Opcode::PrePunc,
        Opcode::PostPunc,
        Opcode::BegNum,
        Opcode::MidNum,
        Opcode::EndNum,
        Opcode::Class,
        Opcode::After,
        Opcode::Before,
        Opcode::Replace,
    ];

    /// Indicator signs in header order.
    pub const SIGNS: [Opcode; 5] = [
        Opcode::CapitalSign,
        Opcode::BeginCapitalSign,
        Opcode::EndCapitalSign,
        Opcode::EnglishLetterSign,
        Opcode::NumberSign,
    ];

    #[inline(always)]
    pub fn from_u8(value: u8) -> Option<Opcode> {
        Self::ALL.get(value as usize).copied()
    }

    pub fn keyword(self) -> &'static str {
        match self {
            Opcode::CapitalSign => "capsign",
            Opcode::BeginCapitalSign => "begcapsign",
            Opcode::EndCapitalSign => "endcapsign",
            Opcode::EnglishLetterSign => "letsign",
            Opcode::NumberSign => "numsign",
            Opcode::Literal => "literal",
            Opcode::Always => "always",
            Opcode::Repeatable => "repeatable",
            Opcode::LargeSign => "largesign",
            Opcode::LastLargeSign => "lastlargesign",
            Opcode::WholeWord => "word",
            Opcode::JoinedWord => "joinword",
            Opcode::LowWord => "lowword",
            Opcode::Contraction => "contraction",
            Opcode::SuffixableWord => "sufword",
            Opcode::PrefixableWord => "prfword",
            Opcode::BegWord => "begword",
            Opcode::BegMidWord => "begmidword",
            Opcode::MidWord => "midword",
            Opcode::MidEndWord => "midendword",
            Opcode::EndWord => "endword",
            Opcode::PrePunc => "prepunc",
            Opcode::PostPunc => "postpunc",
            Opcode::BegNum => "begnum",
            Opcode::MidNum => "midnum",
            Opcode::EndNum => "endnum",
            Opcode::Class => "class",
            Opcode::After => "after",
            Opcode::Before => "before",
            Opcode::Replace => "replace",
        }
    }

    pub fn from_keyword(keyword: &str) -> Option<Opcode> {
        match keyword {
            "begcaps" => Some(Opcode::BeginCapitalSign),
            "endcaps" => Some(Opcode::EndCapitalSign),
            _ => Self::ALL.iter().copied().find(|op| op.keyword() == keyword),
        }
    }

    /// Position of an indicator sign in the table header.
    #[inline]
    pub fn sign_index(self) -> Option<usize> {
        Self::SIGNS.iter().position(|&sign| sign == self)
    }

    /// Rules written as `keyword find dots`.
    pub fn takes_dots(self) -> bool {
        matches!(
            self,
            Opcode::Always
                | Opcode::Repeatable
                | Opcode::LargeSign
                | Opcode::LastLargeSign
                | Opcode::WholeWord
                | Opcode::JoinedWord
                | Opcode::LowWord
                | Opcode::SuffixableWord
                | Opcode::PrefixableWord
                | Opcode::BegWord
                | Opcode::BegMidWord
                | Opcode::MidWord
                | Opcode::MidEndWord
                | Opcode::EndWord
                | Opcode::PrePunc
                | Opcode::PostPunc
                | Opcode::BegNum
                | Opcode::MidNum
                | Opcode::EndNum
        )
    }

    /// Whether a rule of this kind can be chosen while matching text.
    pub fn is_matchable(self) -> bool {
        !matches!(self, Opcode::Class | Opcode::After | Opcode::Before) && self.sign_index().is_none()
    }
}

impl std::fmt::Display for Opcode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.keyword())
    }
}

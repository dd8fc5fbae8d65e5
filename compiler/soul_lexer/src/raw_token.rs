//! Logos-derived tokenizer definition.
//!
//! The raw token layer matches lexemes; value cooking (numeric parsing,
//! escape handling, interning) happens in `convert`. A `-` directly
//! adjacent to a following digit is matched into the literal; the parser
//! turns `x -1` back into a subtraction, preserving the surface-language
//! rule that only a spaced minus is an operator.

use logos::Logos;

#[derive(Logos, Debug, Clone, Copy, PartialEq, Eq)]
#[logos(skip r"[ \t\r\n]+")]
#[logos(skip r"//[^\n]*")]
#[logos(skip r"/\*([^*]|\*+[^*/])*\*+/")]
pub enum RawToken {
    // ── Keywords ──
    #[token("if")]
    If,
    #[token("else")]
    Else,
    #[token("do")]
    Do,
    #[token("while")]
    While,
    #[token("for")]
    For,
    #[token("loop")]
    Loop,
    #[token("break")]
    Break,
    #[token("continue")]
    Continue,
    #[token("return")]
    Return,
    #[token("const")]
    Const,
    #[token("let")]
    Let,
    #[token("var")]
    Var,
    #[token("void")]
    Void,
    #[token("int")]
    Int,
    #[token("int32")]
    Int32,
    #[token("int64")]
    Int64,
    #[token("float")]
    Float,
    #[token("float32")]
    Float32,
    #[token("float64")]
    Float64,
    #[token("fixed")]
    Fixed,
    #[token("bool")]
    Bool,
    #[token("true")]
    True,
    #[token("false")]
    False,
    #[token("string")]
    String,
    #[token("struct")]
    Struct,
    #[token("using")]
    Using,
    #[token("external")]
    External,
    #[token("graph")]
    Graph,
    #[token("processor")]
    Processor,
    #[token("namespace")]
    Namespace,
    #[token("input")]
    Input,
    #[token("output")]
    Output,
    #[token("connection")]
    Connection,
    #[token("event")]
    Event,
    #[token("import")]
    Import,
    #[token("try")]
    Try,
    #[token("catch")]
    Catch,
    #[token("throw")]
    Throw,
    #[token("switch")]
    Switch,
    #[token("case")]
    Case,
    #[token("default")]
    Default,
    #[token("enum")]
    Enum,

    // ── Identifiers and literals ──
    #[regex(r"[A-Za-z][A-Za-z0-9_]*", priority = 2)]
    Ident,

    /// Decimal or hex integer, optional adjacent minus, optional `L`.
    #[regex(r"-?[0-9]+[Ll]?", priority = 3)]
    #[regex(r"-?0[xX][0-9a-fA-F]+[Ll]?", priority = 4)]
    IntLiteral,

    /// Float literal, optional adjacent minus, optional `f`.
    #[regex(r"-?[0-9]+\.[0-9]+([eE][+-]?[0-9]+)?[fF]?", priority = 4)]
    #[regex(r"-?[0-9]+[eE][+-]?[0-9]+[fF]?", priority = 4)]
    FloatLiteral,

    #[regex(r#""([^"\\\n]|\\.)*""#)]
    StringLiteral,

    // ── Punctuation and operators ──
    #[token(";")]
    Semicolon,
    #[token(",")]
    Comma,
    #[token(".")]
    Dot,
    #[token("::")]
    DoubleColon,
    #[token(":")]
    Colon,
    #[token("?")]
    Question,
    #[token("(")]
    OpenParen,
    #[token(")")]
    CloseParen,
    #[token("{")]
    OpenBrace,
    #[token("}")]
    CloseBrace,
    #[token("[")]
    OpenBracket,
    #[token("]")]
    CloseBracket,
    #[token("[[")]
    OpenDoubleBracket,
    #[token("]]")]
    CloseDoubleBracket,
    #[token("->")]
    RightArrow,
    #[token("=")]
    Assign,
    #[token("==")]
    Equals,
    #[token("!=")]
    NotEquals,
    #[token("<")]
    LessThan,
    #[token("<=")]
    LessThanOrEqual,
    #[token(">")]
    GreaterThan,
    #[token(">=")]
    GreaterThanOrEqual,
    #[token("+")]
    Plus,
    #[token("-")]
    Minus,
    #[token("*")]
    Times,
    #[token("/")]
    Divide,
    #[token("%")]
    Modulo,
    #[token("++")]
    PlusPlus,
    #[token("--")]
    MinusMinus,
    #[token("+=")]
    PlusEquals,
    #[token("-=")]
    MinusEquals,
    #[token("*=")]
    TimesEquals,
    #[token("/=")]
    DivideEquals,
    #[token("%=")]
    ModuloEquals,
    #[token("<<")]
    LeftShift,
    #[token(">>")]
    RightShift,
    #[token(">>>")]
    RightShiftUnsigned,
    #[token("<<=")]
    LeftShiftEquals,
    #[token(">>=")]
    RightShiftEquals,
    #[token(">>>=")]
    RightShiftUnsignedEquals,
    #[token("&&")]
    LogicalAnd,
    #[token("||")]
    LogicalOr,
    #[token("!")]
    LogicalNot,
    #[token("&")]
    BitwiseAnd,
    #[token("|")]
    BitwiseOr,
    #[token("^")]
    BitwiseXor,
    #[token("~")]
    BitwiseNot,
    #[token("&=")]
    AndEquals,
    #[token("|=")]
    OrEquals,
    #[token("^=")]
    XorEquals,
}

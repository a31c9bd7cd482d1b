//! Abstract Syntax Tree (AST) Types for Bash++
//!
//! The AST is a tagged union: every construct the emitter cares about has
//! its own node struct, and everything else survives as raw Bash text.
//! Bash++ is a superset of Bash, so the tree is deliberately sparse: a plain
//! Bash script parses to little more than a list of raw-text statements.

use serde::Serialize;

// =============================================================================
// BASE TYPES
// =============================================================================

/// Position information for diagnostics (0-based line and column)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct Position {
    pub line: usize,
    pub column: usize,
}

impl Position {
    pub fn new(line: usize, column: usize) -> Self {
        Self { line, column }
    }
}

/// Span in source code
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct Span {
    pub start: Position,
    pub end: Position,
}

impl Span {
    pub fn new(start: Position, end: Position) -> Self {
        Self { start, end }
    }

    pub fn point(pos: Position) -> Self {
        Self { start: pos, end: pos }
    }

    pub fn contains(&self, pos: Position) -> bool {
        let after_start = pos.line > self.start.line
            || (pos.line == self.start.line && pos.column >= self.start.column);
        let before_end = pos.line < self.end.line
            || (pos.line == self.end.line && pos.column <= self.end.column);
        after_start && before_end
    }
}

/// An identifier with its source position
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Ident {
    pub name: String,
    pub pos: Position,
}

impl Ident {
    pub fn new(name: impl Into<String>, pos: Position) -> Self {
        Self { name: name.into(), pos }
    }
}

// =============================================================================
// SCRIPT & STATEMENTS
// =============================================================================

/// Root node: a complete Bash++ source file
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Script {
    pub statements: Vec<Node>,
}

/// A block of statement-level nodes
pub type Block = Vec<Node>;

/// Union of all node types
#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum Node {
    /// Plain Bash text, passed through unmodified
    RawText(RawTextNode),
    /// A `# ...` comment
    Comment(RawTextNode),
    /// A single-quoted string, contents opaque
    SinglequoteString(RawTextNode),
    /// A double-quoted string whose parts may contain references
    StringLiteral(StringNode),
    /// One statement: pipelines joined by `&&` / `||`
    Statement(StatementNode),
    /// `@( ... )`
    Supershell(SupershellNode),
    /// `@obj.member...`, `@this...`, `@super...`
    ObjectReference(ObjectReferenceNode),
    /// `*@ptr...`
    PointerDereference(Box<ObjectReferenceNode>),
    /// `&@obj...`
    ObjectAddress(Box<ObjectReferenceNode>),
    /// `@nullptr`
    NullptrRef(NullptrNode),
    /// `@new ClassName`
    New(NewNode),
    /// `@delete <reference>`
    Delete(DeleteNode),
    /// `@dynamic_cast<Type> <reference>`
    DynamicCast(DynamicCastNode),
    /// `@typeof <reference>`
    Typeof(TypeofNode),
    /// `@Class name` or `@Class name = @other`
    ObjectInstantiation(ObjectInstantiationNode),
    /// `@Class* name` with optional initializer
    PointerDeclaration(PointerDeclarationNode),
    /// `@lvalue = rvalue` or `@lvalue += rvalue`
    ObjectAssignment(ObjectAssignmentNode),
    /// `@class Name [: Parent] { ... }`
    ClassDefinition(ClassDefinitionNode),
    /// `@include` / `@include_once`
    Include(IncludeNode),
    /// `if ... elif ... else ... fi`
    If(IfNode),
    /// `while`/`until ...; do ...; done`
    WhileOrUntil(WhileNode),
    /// `for`/`select ...; do ...; done`
    For(ForNode),
    /// `case ... in ... esac`
    Case(CaseNode),
    /// `name() { ... }` or `function name { ... }`
    FunctionDefinition(FunctionNode),
    /// `{ ...; }` brace group
    Group(GroupNode),
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RawTextNode {
    pub text: String,
    pub pos: Position,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StringNode {
    pub parts: Vec<Node>,
    pub pos: Position,
}

/// Connective between pipelines in a statement
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Connective {
    And, // &&
    Or,  // ||
}

/// A statement: one or more pipelines joined by `&&` / `||`.
///
/// When `connectives` is empty the statement is a single pipeline and no
/// gating braces are emitted.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StatementNode {
    pub pipelines: Vec<Vec<Node>>,
    pub connectives: Vec<Connective>,
    pub pos: Position,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SupershellNode {
    pub body: Block,
    pub pos: Position,
}

// =============================================================================
// REFERENCES
// =============================================================================

/// A chain of dotted identifiers following an `@` sigil.
///
/// The first identifier may be `this` or `super`. `array_index` holds the
/// parts between `[` and `]` when the reference ends in an index access, and
/// `length_query` is set for the `@#ref[@]` form.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ObjectReferenceNode {
    pub ids: Vec<Ident>,
    pub array_index: Option<Vec<Node>>,
    pub length_query: bool,
    pub pos: Position,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NullptrNode {
    pub pos: Position,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NewNode {
    pub class_name: Ident,
    pub pos: Position,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DeleteNode {
    pub target: ObjectReferenceNode,
    pub pos: Position,
}

/// The `<...>` target of a dynamic cast: either a class name known at
/// compile time, or shell text evaluated at runtime.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum CastTarget {
    ClassName(Ident),
    Runtime(String),
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DynamicCastNode {
    pub target: CastTarget,
    pub operand: Vec<Node>,
    pub pos: Position,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TypeofNode {
    pub operand: Vec<Node>,
    pub pos: Position,
}

// =============================================================================
// DECLARATIONS & ASSIGNMENTS
// =============================================================================

/// An rvalue: the parts to the right of `=`, plus array/append flags
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ValueNode {
    pub parts: Vec<Node>,
    pub is_array: bool,
    pub pos: Position,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ObjectInstantiationNode {
    pub class_name: Ident,
    pub name: Ident,
    /// `@Class obj = @other` copy-instantiation source
    pub copy_from: Option<ObjectReferenceNode>,
    pub pos: Position,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PointerDeclarationNode {
    pub class_name: Ident,
    pub name: Ident,
    pub value: Option<ValueNode>,
    pub pos: Position,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ObjectAssignmentNode {
    pub lvalue: ObjectReferenceNode,
    /// `*@ptr = ...` assigns through the pointer
    pub deref: bool,
    pub adding: bool,
    pub value: ValueNode,
    pub pos: Position,
}

// =============================================================================
// CLASS DEFINITIONS
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum VisibilityKeyword {
    Public,
    Protected,
    Private,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ClassDefinitionNode {
    pub name: Ident,
    pub parent: Option<Ident>,
    pub items: Vec<ClassItem>,
    pub pos: Position,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum ClassItem {
    Member(MemberDeclNode),
    Method(MethodDefNode),
    Constructor(MethodDefNode),
    Destructor(MethodDefNode),
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum MemberKind {
    /// `@public name` / `@public name=value` / `@public name=(...)`
    Primitive { default: Option<ValueNode> },
    /// `@public @Class name`
    Object { class_name: Ident },
    /// `@public @Class* name [= value]`
    Pointer { class_name: Ident, default: Option<ValueNode> },
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MemberDeclNode {
    pub visibility: VisibilityKeyword,
    pub name: Ident,
    pub kind: MemberKind,
    pub pos: Position,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MethodParamNode {
    /// None for primitive parameters
    pub type_name: Option<Ident>,
    pub is_pointer: bool,
    pub name: Ident,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MethodDefNode {
    pub visibility: VisibilityKeyword,
    pub is_virtual: bool,
    pub name: Ident,
    pub params: Vec<MethodParamNode>,
    pub body: Block,
    pub pos: Position,
}

// =============================================================================
// INCLUDES
// =============================================================================

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct IncludeNode {
    pub once: bool,
    pub dynamic: bool,
    /// `<path>` (searched in include paths) vs `"path"` (relative)
    pub system: bool,
    pub path: String,
    pub as_path: Option<String>,
    pub pos: Position,
}

// =============================================================================
// CONTROL FLOW
// =============================================================================

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct IfBranch {
    pub condition: Vec<Node>,
    pub body: Block,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct IfNode {
    pub branches: Vec<IfBranch>,
    pub else_body: Option<Block>,
    pub pos: Position,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct WhileNode {
    pub until: bool,
    pub condition: Vec<Node>,
    pub body: Block,
    pub pos: Position,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ForNode {
    /// `for` or `select`
    pub keyword: String,
    /// Everything between the keyword and `do`, emitted in place
    pub header: Vec<Node>,
    pub body: Block,
    pub pos: Position,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CasePattern {
    pub pattern: Vec<Node>,
    pub body: Block,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CaseNode {
    pub subject: Vec<Node>,
    pub patterns: Vec<CasePattern>,
    pub pos: Position,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FunctionNode {
    pub name: String,
    /// The header exactly as written: `name()` or `function name`
    pub header: String,
    pub body: Block,
    pub pos: Position,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GroupNode {
    pub body: Block,
    pub pos: Position,
}

//! Frozen runtime-library templates
//!
//! These are emitted into the compiled output the first time they are
//! needed, tracked by the Program's global counters. Their names form the
//! fixed boundary between the generator and the emitted runtime: changing
//! one here is an output-format change.

use std::collections::HashSet;

use lazy_static::lazy_static;

/// Supershell fallback for targets below Bash 5.3: runs a function in a
/// command substitution and stores its stdout in the named variable.
pub const SUPERSHELL_FUNCTION: &str = r#"function bpp____supershell() {
	local __outputVar="$1" __runFunc="$2"
	local __output
	__output="$(${__runFunc})"
	eval "${__outputVar}=\"\${__output}\""
}
"#;

/// Walks the receiver's `____vPointer` and its `__parent__` chain and binds
/// the first matching vTable cell reference to the output variable. The
/// caller dereferences the cell with `${!outvar}` to get the function name.
pub const VTABLE_LOOKUP: &str = r#"function bpp____vTable__lookup() {
	local __address="$1" __method="$2" __outVar="$3"
	local __vTable="${__address}____vPointer"
	__vTable="${!__vTable}"
	local __entry
	while [[ -n "${__vTable}" ]]; do
		__entry="${__vTable}[${__method}]"
		if [[ -n "${!__entry}" ]]; then
			eval "${__outVar}=\"${__entry}\""
			return 0
		fi
		__entry="${__vTable}[__parent__]"
		__vTable="${!__entry}"
	done
	return 1
}
"#;

/// Compares the pointee's vTable chain against the target class's vTable
/// and stores either the address or the null sentinel in the output
/// variable.
pub const DYNAMIC_CAST: &str = r#"function bpp____dynamic__cast() {
	local __targetClass="$1" __outVar="$2" __address="$3"
	local __targetVTable="bpp__${__targetClass}____vTable"
	local __vTable="${__address}____vPointer"
	__vTable="${!__vTable}"
	local __entry
	while [[ -n "${__vTable}" ]]; do
		if [[ "${__vTable}" == "${__targetVTable}" ]]; then
			eval "${__outVar}=\"${__address}\""
			return 0
		fi
		__entry="${__vTable}[__parent__]"
		__vTable="${!__entry}"
	done
	eval "${__outVar}=0"
	return 1
}
"#;

/// Reads the class name out of the receiver's vTable name
pub const TYPEOF_FUNCTION: &str = r#"function bpp____typeof() {
	local __address="$1" __outVar="$2"
	local __vTable="${__address}____vPointer"
	__vTable="${!__vTable}"
	if [[ -z "${__vTable}" ]]; then
		eval "${__outVar}=primitive"
		return 1
	fi
	__vTable="${__vTable#bpp__}"
	eval "${__outVar}=\"${__vTable%____vTable}\""
}
"#;

/// Re-raises a saved exit status, so post-code can run between a gated
/// command and the connective that tests it
pub const REPEAT_FUNCTION: &str = r#"function bpp____repeat() {
	return "$1"
}
"#;

/// Prepended to every method body except `__new`: rejects calls on null or
/// never-constructed receivers before the user code runs.
pub const THIS_POINTER_VALIDATION: &str = r#"	if [[ -z "${__this}" || "${__this}" == "0" ]]; then
		echo "Bash++: error: null or invalid @this pointer" >&2
		return 1
	fi
	local __vPointerCheck="${__this}____vPointer"
	if [[ -z "${!__vPointerCheck}" ]]; then
		echo "Bash++: error: method call on invalid object: ${__this}" >&2
		return 1
	fi
	unset __vPointerCheck
"#;

/// The method wrapper. The receiver address arrives in `$1` and binds to
/// `__this`; declared parameters bind from `$2` upward.
pub const METHOD_TEMPLATE: &str = r#"function bpp__%CLASS%__%SIGNATURE%() {
	local __this="$1"
%THIS_POINTER_VALIDATION%%PARAMS%%METHODBODY%}
"#;

lazy_static! {
    /// Names that can never be used for classes or objects
    pub static ref PROTECTED_KEYWORDS: HashSet<&'static str> = {
        let mut set = HashSet::new();
        for kw in [
            "class", "constructor", "delete", "destructor", "dynamic_cast", "include",
            "include_once", "method", "new", "nullptr", "primitive", "private", "protected",
            "public", "super", "this", "typeof", "virtual",
        ] {
            set.insert(kw);
        }
        set
    };

    /// Compiler-provided methods that exist on every class even when no
    /// user definition is visible. The flag records whether calls dispatch
    /// through the vTable.
    pub static ref SYSTEM_METHODS: HashSet<(&'static str, bool)> = {
        let mut set = HashSet::new();
        set.insert(("__new", false));
        set.insert(("__constructor", false));
        set.insert(("__copy", false));
        set.insert(("__destructor", true));
        set.insert(("__delete", true));
        set.insert(("toPrimitive", true));
        set
    };
}

/// Look up a system method by name; returns its virtual flag
pub fn system_method(name: &str) -> Option<bool> {
    SYSTEM_METHODS
        .iter()
        .find(|(n, _)| *n == name)
        .map(|(_, is_virtual)| *is_virtual)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_system_method_registry() {
        assert_eq!(system_method("__delete"), Some(true));
        assert_eq!(system_method("__new"), Some(false));
        assert_eq!(system_method("__frobnicate"), None);
    }

    #[test]
    fn test_protected_keywords() {
        assert!(PROTECTED_KEYWORDS.contains("this"));
        assert!(PROTECTED_KEYWORDS.contains("primitive"));
        assert!(!PROTECTED_KEYWORDS.contains("window"));
    }
}

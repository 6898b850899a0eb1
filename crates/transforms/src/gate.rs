//! Per-function pass selection from attribute tokens.

/// Decides whether the pass `pass_name` runs on a function carrying `attributes`.
///
/// Tokens are inspected in declaration order. A token containing `"no" + pass_name` disables the
/// pass, otherwise a token containing `pass_name` enables it; the first token matching either way
/// wins. Without a match the global default applies.
///
/// Matching is by substring, not token equality, and the negative form is tested first within a
/// token. A token such as `"nofla_fla"` therefore disables `fla`, and a pass name that happens to
/// be a substring of an unrelated token is affected by it.
pub fn should_apply(default_enabled: bool, attributes: &[String], pass_name: &str) -> bool {
    let negative = format!("no{pass_name}");
    for token in attributes {
        if token.contains(&negative) {
            return false;
        }
        if token.contains(pass_name) {
            return true;
        }
    }
    default_enabled
}

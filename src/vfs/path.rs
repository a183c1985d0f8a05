//! Path tokenization: splitting a `/`-separated path into bounded
//! tokens, prepending the current working directory, and handling `.`
//! and `..`.

use crate::collections::{ArrayVec, Bytes};
use crate::config::{NAME_MAX, PATH_MAX, PATH_MAX_TOK};
use crate::errno::{SfsError, SfsResult};

/// One path component, bounded to `NAME_MAX` bytes.
pub type Token = Bytes<NAME_MAX>;
/// A fully resolved, absolute sequence of path components.
pub type PathTokens = ArrayVec<Token, PATH_MAX_TOK>;

/// Splits `path` into tokens, prepending `cwd` when `path` is not
/// absolute (does not start with `/`). `.` components are dropped; `..`
/// pops the previous token, failing with `WrongPath` if there is none.
pub fn splitpath(path: &[u8], cwd: &PathTokens) -> SfsResult<PathTokens> {
    if path.len() > PATH_MAX {
        return Err(SfsError::PathTooBig);
    }
    let mut toks: PathTokens = if path.first() == Some(&b'/') {
        PathTokens::new()
    } else {
        *cwd
    };
    for comp in path.split(|&b| b == b'/') {
        if comp.is_empty() || comp == b"." {
            continue;
        }
        if comp == b".." {
            if toks.pop().is_none() {
                return Err(SfsError::WrongPath);
            }
            continue;
        }
        let tok = Token::from_slice(comp, SfsError::PathTooLong)?;
        toks.push(tok, SfsError::PathTooBig)?;
    }
    Ok(toks)
}

/// True if `prefix` is a component-wise prefix of `full`.
pub fn is_prefix(prefix: &PathTokens, full: &PathTokens) -> bool {
    if prefix.len() > full.len() {
        return false;
    }
    prefix.iter().zip(full.iter()).all(|(a, b)| a == b)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn toks(strs: &[&[u8]]) -> PathTokens {
        let mut t = PathTokens::new();
        for s in strs {
            t.push(Token::from_slice(s, SfsError::PathTooLong).unwrap(), SfsError::PathTooBig)
                .unwrap();
        }
        t
    }

    #[test]
    fn absolute_path_ignores_cwd() {
        let cwd = toks(&[b"home"]);
        let r = splitpath(b"/etc/conf", &cwd).unwrap();
        assert_eq!(r, toks(&[b"etc", b"conf"]));
    }

    #[test]
    fn relative_path_prepends_cwd() {
        let cwd = toks(&[b"home", b"user"]);
        let r = splitpath(b"docs/a.txt", &cwd).unwrap();
        assert_eq!(r, toks(&[b"home", b"user", b"docs", b"a.txt"]));
    }

    #[test]
    fn dot_components_are_dropped() {
        let cwd = PathTokens::new();
        let r = splitpath(b"/a/./b/.", &cwd).unwrap();
        assert_eq!(r, toks(&[b"a", b"b"]));
    }

    #[test]
    fn dot_dot_pops_previous_token() {
        let cwd = PathTokens::new();
        let r = splitpath(b"/a/b/../c", &cwd).unwrap();
        assert_eq!(r, toks(&[b"a", b"c"]));
    }

    #[test]
    fn dot_dot_with_no_parent_is_wrong_path() {
        let cwd = PathTokens::new();
        assert_eq!(splitpath(b"/..", &cwd), Err(SfsError::WrongPath));
    }

    #[test]
    fn prefix_matching_respects_component_boundaries() {
        let a = toks(&[b"mnt"]);
        let b = toks(&[b"mnt", b"data"]);
        assert!(is_prefix(&a, &b));
        assert!(!is_prefix(&b, &a));
    }
}

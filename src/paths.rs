/// Syntax rules for one path convention.
///
/// Paths are plain strings and never touch a real filesystem. Inputs are
/// assumed to be lexically clean (no `.`/`..`, no doubled separators).
pub trait Dialect {
    /// True if the path is rooted. On Windows a bare `\path` without a
    /// volume counts as absolute.
    fn is_abs(&self, path: &str) -> bool;

    /// Number of components in the path; the root itself is 0.
    fn depth(&self, path: &str) -> usize;

    fn is_path_separator(&self, c: u8) -> bool;

    /// Length of the volume section (`c:` or `\\server`) of a path.
    fn vol_len(&self, path: &str) -> usize;
}

/// Windows rules for `os == "windows"`, Unix rules for anything else.
pub fn dialect_for(os: &str) -> &'static dyn Dialect {
    match os {
        "windows" => &Windows,
        _ => &Unix,
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct Unix;

#[derive(Debug, Clone, Copy, Default)]
pub struct Windows;

impl Dialect for Unix {
    fn is_abs(&self, path: &str) -> bool {
        path.starts_with('/')
    }

    fn depth(&self, path: &str) -> usize {
        match path.strip_prefix('/') {
            Some(rest) => rel_path_depth(rest, self),
            None => rel_path_depth(path, self),
        }
    }

    fn is_path_separator(&self, c: u8) -> bool {
        c == b'/'
    }

    fn vol_len(&self, _path: &str) -> usize {
        0
    }
}

impl Dialect for Windows {
    fn is_abs(&self, path: &str) -> bool {
        if is_unc(path) {
            return true;
        }
        // `c:` and `c:foo` are relative to the working dir on c:
        let vol_len = self.vol_len(path);
        path.as_bytes()
            .get(vol_len)
            .is_some_and(|&c| self.is_path_separator(c))
    }

    fn depth(&self, path: &str) -> usize {
        let vol_len = self.vol_len(path);
        let rest = &path[vol_len..];
        match rest.as_bytes().first() {
            None => 0,
            Some(&c) if self.is_path_separator(c) => rel_path_depth(&rest[1..], self),
            Some(_) => rel_path_depth(rest, self),
        }
    }

    fn is_path_separator(&self, c: u8) -> bool {
        c == b'/' || c == b'\\'
    }

    fn vol_len(&self, path: &str) -> usize {
        if has_drive_letter(path) {
            return 2;
        }
        if is_unc(path) {
            return match path.as_bytes()[2..].iter().position(|&c| c == b'\\') {
                Some(index) => 2 + index,
                None => path.len(),
            };
        }
        0
    }
}

fn has_drive_letter(path: &str) -> bool {
    let b = path.as_bytes();
    b.len() >= 2 && b[0].is_ascii_alphabetic() && b[1] == b':'
}

fn is_unc(path: &str) -> bool {
    let b = path.as_bytes();
    b.len() > 2 && b[0] == b'\\' && b[1] == b'\\' && b[2] != b'\\'
}

/// Number of components in a path that has already had its root stripped.
pub(crate) fn rel_path_depth<D: Dialect + ?Sized>(path: &str, dialect: &D) -> usize {
    if path.is_empty() {
        return 0;
    }
    1 + path
        .bytes()
        .filter(|&c| dialect.is_path_separator(c))
        .count()
}

/// Longest common directory prefix of `a` and `b`, with its depth.
///
/// The prefix only ends on a component boundary, so `/apple` and `/app`
/// share `/`, not `/app`. A volume section is never cut in half.
pub fn common_prefix<'a, D: Dialect + ?Sized>(
    a: &'a str,
    b: &'a str,
    dialect: &D,
) -> (&'a str, usize) {
    if a == b {
        return (a, dialect.depth(a));
    }
    // b is the shorter one
    let (a, b) = if a.len() < b.len() { (b, a) } else { (a, b) };
    let (ab, bb) = (a.as_bytes(), b.as_bytes());

    let vol_len = dialect.vol_len(a);
    let mut prefix = "";
    for i in 0..bb.len() {
        if ab[i] != bb[i] {
            return (prefix, dialect.depth(prefix));
        } else if dialect.is_path_separator(bb[i]) {
            prefix = if i == vol_len {
                // keep the root separator: `c:\`, `\\server\` or `/`
                &b[..=vol_len]
            } else {
                &b[..i]
            };
        } else if i + 1 == vol_len {
            prefix = &b[..vol_len];
        }
    }

    // b is a literal prefix of a and a is strictly longer
    if dialect.is_path_separator(ab[bb.len()]) {
        prefix = b;
    }
    (prefix, dialect.depth(prefix))
}

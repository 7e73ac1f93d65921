//! Rewriting of class names embedded in descriptors and generic signatures.
//!
//! `map` receives an internal class name (`net/x/abc`) and returns the new
//! name, or `None` to keep it. Input that does not follow the signature
//! grammar is returned unchanged.

/// Rewrites a `Class` constant value, which is either an internal name or an
/// array descriptor.
pub fn remap_class_reference<F>(name: &str, map: F) -> String
where
    F: Fn(&str) -> Option<String>,
{
    if name.starts_with('[') {
        remap_descriptor(name, map)
    } else {
        map(name).unwrap_or_else(|| name.to_string())
    }
}

/// Rewrites every `L<name>;` of a field or method descriptor.
pub fn remap_descriptor<F>(descriptor: &str, map: F) -> String
where
    F: Fn(&str) -> Option<String>,
{
    let mut out = String::with_capacity(descriptor.len());
    let mut rest = descriptor;
    // Primitive tags never use 'L', so the next 'L' always starts a class type.
    while let Some(start) = rest.find('L') {
        out.push_str(&rest[..=start]);
        let after = &rest[start + 1..];
        match after.find(';') {
            Some(end) => {
                let name = &after[..end];
                match map(name) {
                    Some(mapped) => out.push_str(&mapped),
                    None => out.push_str(name),
                }
                out.push(';');
                rest = &after[end + 1..];
            }
            None => {
                out.push_str(after);
                rest = "";
            }
        }
    }
    out.push_str(rest);
    out
}

/// Rewrites a class, method or field generic signature.
pub fn remap_signature<F>(signature: &str, map: F) -> String
where
    F: Fn(&str) -> Option<String>,
{
    let mut parser = SignatureParser {
        src: signature,
        pos: 0,
        out: String::with_capacity(signature.len()),
        map: &map,
    };
    match parser.signature() {
        Some(()) if parser.pos == signature.len() => parser.out,
        _ => signature.to_string(),
    }
}

struct SignatureParser<'a, 'm, F> {
    src: &'a str,
    pos: usize,
    out: String,
    map: &'m F,
}

impl<'a, F> SignatureParser<'a, '_, F>
where
    F: Fn(&str) -> Option<String>,
{
    fn peek(&self) -> Option<u8> {
        self.src.as_bytes().get(self.pos).copied()
    }

    fn bump(&mut self, expected: u8) -> Option<()> {
        if self.peek()? != expected {
            return None;
        }
        self.out.push(expected as char);
        self.pos += 1;
        Some(())
    }

    /// Consumes an identifier up to (not including) one of `stops`.
    fn identifier(&mut self, stops: &[u8]) -> Option<&'a str> {
        let start = self.pos;
        while let Some(byte) = self.peek() {
            if stops.contains(&byte) {
                break;
            }
            self.pos += 1;
        }
        let src = self.src;
        if self.pos == start || self.pos >= src.len() {
            return None;
        }
        Some(&src[start..self.pos])
    }

    fn signature(&mut self) -> Option<()> {
        if self.peek() == Some(b'<') {
            self.type_parameters()?;
        }

        if self.peek() == Some(b'(') {
            self.bump(b'(')?;
            while self.peek()? != b')' {
                self.java_type()?;
            }
            self.bump(b')')?;
            if self.peek()? == b'V' {
                self.bump(b'V')?;
            } else {
                self.java_type()?;
            }
            while self.peek() == Some(b'^') {
                self.bump(b'^')?;
                self.reference_type()?;
            }
        } else {
            while self.pos < self.src.len() {
                self.reference_type()?;
            }
        }
        Some(())
    }

    fn type_parameters(&mut self) -> Option<()> {
        self.bump(b'<')?;
        while self.peek()? != b'>' {
            let name = self.identifier(b":")?;
            self.out.push_str(name);
            self.bump(b':')?;
            if matches!(self.peek()?, b'L' | b'T' | b'[') {
                self.reference_type()?;
            }
            while self.peek()? == b':' {
                self.bump(b':')?;
                self.reference_type()?;
            }
        }
        self.bump(b'>')
    }

    fn java_type(&mut self) -> Option<()> {
        match self.peek()? {
            tag @ (b'B' | b'C' | b'D' | b'F' | b'I' | b'J' | b'S' | b'Z') => self.bump(tag),
            _ => self.reference_type(),
        }
    }

    fn reference_type(&mut self) -> Option<()> {
        match self.peek()? {
            b'L' => self.class_type(),
            b'T' => {
                self.bump(b'T')?;
                let name = self.identifier(b";")?;
                self.out.push_str(name);
                self.bump(b';')
            }
            b'[' => {
                self.bump(b'[')?;
                self.java_type()
            }
            _ => None,
        }
    }

    fn class_type(&mut self) -> Option<()> {
        self.bump(b'L')?;
        let name = self.identifier(b";<.")?;
        let mapped = (self.map)(name).unwrap_or_else(|| name.to_string());
        self.out.push_str(&mapped);

        let mut original_outer = name.to_string();
        let mut mapped_outer = mapped;
        loop {
            match self.peek()? {
                b'<' => self.type_arguments()?,
                b'.' => {
                    self.bump(b'.')?;
                    let inner = self.identifier(b";<.")?;
                    let original_full = format!("{original_outer}${inner}");
                    let mapped_full = (self.map)(&original_full)
                        .unwrap_or_else(|| format!("{mapped_outer}${inner}"));
                    let prefix = format!("{mapped_outer}$");
                    let simple = mapped_full.strip_prefix(&prefix).unwrap_or(inner);
                    self.out.push_str(simple);
                    original_outer = original_full;
                    mapped_outer = mapped_full;
                }
                b';' => return self.bump(b';'),
                _ => return None,
            }
        }
    }

    fn type_arguments(&mut self) -> Option<()> {
        self.bump(b'<')?;
        while self.peek()? != b'>' {
            match self.peek()? {
                b'*' => self.bump(b'*')?,
                wildcard @ (b'+' | b'-') => {
                    self.bump(wildcard)?;
                    self.reference_type()?;
                }
                _ => self.reference_type()?,
            }
        }
        self.bump(b'>')
    }
}

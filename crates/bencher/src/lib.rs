#[derive(Debug, Copy, Clone)]
pub struct TestCase<I> {
    name: &'static str,
    group: TestGroup,
    input: I,
}

impl<I> TestCase<I> {
    pub fn new(name: &'static str, group: TestGroup, input: I) -> Self {
        Self { name, group, input }
    }

    pub fn small(name: &'static str, input: I) -> Self {
        Self::new(name, TestGroup::Small, input)
    }

    pub fn normal(name: &'static str, input: I) -> Self {
        Self::new(name, TestGroup::Normal, input)
    }

    pub fn large(name: &'static str, input: I) -> Self {
        Self::new(name, TestGroup::Large, input)
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn group(&self) -> TestGroup {
        self.group
    }

    pub fn input(&self) -> &I {
        &self.input
    }
}

/// Shape of a generated `multipart/form-data` body.
#[derive(Debug, Copy, Clone)]
pub struct MultipartInput {
    parts: usize,
    payload_len: usize,
}

impl MultipartInput {
    pub const fn new(parts: usize, payload_len: usize) -> Self {
        Self { parts, payload_len }
    }

    pub fn parts(&self) -> usize {
        self.parts
    }

    /// Payload of part `index`: printable bytes with a line break every 64 bytes, so the
    /// decoder meets both long data lines and CRLF pairs inside the payload.
    pub fn payload(&self, index: usize) -> Vec<u8> {
        (0..self.payload_len)
            .map(|i| match i % 66 {
                64 => b'\r',
                65 => b'\n',
                n => b'a' + u8::try_from((n + index) % 26).unwrap_or(0),
            })
            .collect()
    }
}

/// A set of route patterns and the paths looked up against them.
#[derive(Debug, Copy, Clone)]
pub struct RouterInput {
    patterns: &'static [&'static str],
    paths: &'static [&'static str],
}

impl RouterInput {
    pub const fn new(patterns: &'static [&'static str], paths: &'static [&'static str]) -> Self {
        Self { patterns, paths }
    }

    pub fn patterns(&self) -> &'static [&'static str] {
        self.patterns
    }

    pub fn paths(&self) -> &'static [&'static str] {
        self.paths
    }
}

#[derive(Clone, Copy, Debug)]
pub enum TestGroup {
    Small,
    Normal,
    Large,
}

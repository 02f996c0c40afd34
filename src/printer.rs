//! `FlexPrinter`, spec §4.6: renders one defline-driven record per call
//! against a small field bundle, from a user-configurable deflate template.

use std::io::Write;

use crate::error::{FqError, FqResult};

#[derive(Debug, Clone)]
enum Token {
    Literal(String),
    Accession,
    SpotId,
    ReadId,
    SpotName,
    SpotGroup,
    ReadLen,
}

/// A parsed defline template, e.g. `@$ac.$si/$ri $sn length=$rl`.
#[derive(Debug, Clone)]
pub struct Template {
    tokens: Vec<Token>,
    uses_spotgroup: bool,
}

impl Template {
    /// Parses a template string. `required_first_char` enforces spec §4.6's
    /// "first non-whitespace character must be @ / > / +" rule.
    pub fn parse(template: &str, required_first_char: char) -> FqResult<Self> {
        let first_non_ws = template.trim_start().chars().next();
        if first_non_ws != Some(required_first_char) {
            return Err(FqError::InvalidArg(format!(
                "template {template:?} must start with '{required_first_char}'"
            )));
        }

        let mut tokens = Vec::new();
        let mut uses_spotgroup = false;
        let mut chars = template.chars().peekable();
        let mut literal = String::new();

        while let Some(c) = chars.next() {
            if c == '$' {
                let token_name: String = std::iter::from_fn(|| chars.by_ref().next_if(|c| c.is_ascii_alphabetic())).collect();
                let token = match token_name.as_str() {
                    "ac" => Some(Token::Accession),
                    "si" => Some(Token::SpotId),
                    "ri" => Some(Token::ReadId),
                    "sn" => Some(Token::SpotName),
                    "sg" => {
                        uses_spotgroup = true;
                        Some(Token::SpotGroup)
                    }
                    "rl" => Some(Token::ReadLen),
                    _ => None,
                };
                match token {
                    Some(t) => {
                        if !literal.is_empty() {
                            tokens.push(Token::Literal(std::mem::take(&mut literal)));
                        }
                        tokens.push(t);
                    }
                    None => {
                        literal.push('$');
                        literal.push_str(&token_name);
                    }
                }
            } else {
                literal.push(c);
            }
        }
        if !literal.is_empty() {
            tokens.push(Token::Literal(literal));
        }

        Ok(Template { tokens, uses_spotgroup })
    }

    /// Whether `$sg` appears in this template — drives `JoinOptions`'s
    /// auto-detected `print_spotgroup`, per spec §3.
    pub fn uses_spotgroup(&self) -> bool {
        self.uses_spotgroup
    }

    fn render(&self, fields: &Fields) -> String {
        let mut out = String::new();
        for token in &self.tokens {
            match token {
                Token::Literal(s) => out.push_str(s),
                Token::Accession => out.push_str(fields.accession),
                Token::SpotId => out.push_str(&fields.spot_id.to_string()),
                Token::ReadId => out.push_str(&fields.read_id.to_string()),
                Token::SpotName => out.push_str(fields.spot_name),
                Token::SpotGroup => out.push_str(fields.spot_group.unwrap_or("")),
                Token::ReadLen => out.push_str(&fields.read_len.to_string()),
            }
        }
        out
    }

    /// Average rendered line length assuming `avg_read_len`-digit `$rl`
    /// expansions, used by the preflight disk-space check (spec §4.6).
    pub fn estimate_len(&self, avg_read_len: u32) -> usize {
        let rl_digits = digits(avg_read_len);
        self.tokens
            .iter()
            .map(|t| match t {
                Token::Literal(s) => s.len(),
                Token::Accession => 12, // typical accession length, e.g. SRR1234567
                Token::SpotId => 10,
                Token::ReadId => 1,
                Token::SpotName => 12,
                Token::SpotGroup => 0,
                Token::ReadLen => rl_digits,
            })
            .sum()
    }
}

fn digits(n: u32) -> usize {
    if n == 0 {
        1
    } else {
        (n as f64).log10().floor() as usize + 1
    }
}

pub struct Fields<'a> {
    pub accession: &'a str,
    pub spot_id: u64,
    pub read_id: u32,
    pub spot_name: &'a str,
    pub spot_group: Option<&'a str>,
    pub read_len: u32,
}

/// Renders FASTA/FASTQ records into a bound writer.
pub struct FlexPrinter {
    defline: Template,
    qual_defline: Option<Template>,
}

impl FlexPrinter {
    pub fn new_fasta(defline: Template) -> Self {
        FlexPrinter { defline, qual_defline: None }
    }

    pub fn new_fastq(defline: Template, qual_defline: Template) -> Self {
        FlexPrinter { defline, qual_defline: Some(qual_defline) }
    }

    /// `defline \n bases \n` for FASTA.
    pub fn print_fasta<W: Write>(&self, w: &mut W, fields: &Fields, bases: &[u8]) -> FqResult<()> {
        writeln!(w, "{}", self.defline.render(fields))?;
        w.write_all(bases)?;
        writeln!(w)?;
        Ok(())
    }

    /// `defline \n bases \n qual_defline \n quality_ascii \n` for FASTQ,
    /// where `quality_ascii[i] = quality_byte[i] + 33` (Phred+33).
    pub fn print_fastq<W: Write>(&self, w: &mut W, fields: &Fields, bases: &[u8], quality: &[u8]) -> FqResult<()> {
        let qual_defline = self.qual_defline.as_ref().expect("FASTQ printer requires a quality defline");
        writeln!(w, "{}", self.defline.render(fields))?;
        w.write_all(bases)?;
        writeln!(w)?;
        writeln!(w, "{}", qual_defline.render(fields))?;
        let ascii: Vec<u8> = quality.iter().map(|q| q + 33).collect();
        w.write_all(&ascii)?;
        writeln!(w)?;
        Ok(())
    }
}

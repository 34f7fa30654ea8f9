use anyhow::{anyhow, bail, ensure, Result};
use nom::branch::alt;
use nom::bytes::complete::{is_not, tag, take_until, take_while, take_while1};
use nom::character::complete::{char, digit1};
use nom::combinator::{all_consuming, map_res, opt};
use nom::error::{ErrorKind, ParseError};
use nom::sequence::{delimited, pair, separated_pair, terminated, tuple};
use nom::{self, IResult};
use smallvec::SmallVec;
use std::num::{ParseFloatError, ParseIntError};
use std::str;
use std::str::FromStr;

/// Annotation dialect of the input file. The two dialects share the
/// eight leading tab-separated columns and differ only in the grammar
/// of the ninth (attributes) column.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AnnotationFormat {
    Gtf,
    Gff,
}

impl AnnotationFormat {
    pub fn is_gtf(self) -> bool {
        self == AnnotationFormat::Gtf
    }
}

impl FromStr for AnnotationFormat {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<AnnotationFormat> {
        match s.to_ascii_lowercase().as_str() {
            "gtf" => Ok(AnnotationFormat::Gtf),
            "gff" | "gff3" => Ok(AnnotationFormat::Gff),
            _ => bail!("unknown annotation file format: '{s}'"),
        }
    }
}

/// A parsed annotation record. The string fields are borrowed from a
/// buffer containing the input line.
#[derive(Debug, Clone, PartialEq)]
pub struct RawRecord<'a> {
    pub seq_id: &'a [u8],
    pub source: &'a [u8],
    pub feature_type: &'a [u8],
    pub start: u64,
    pub end: u64,
    pub score: Option<f64>,
    pub strand: &'a [u8],
    pub frame: &'a [u8],
    pub attributes: AttrVec<'a>,
}

impl<'a> RawRecord<'a> {
    pub fn attr(&self, attribute: &str) -> Option<&'a [u8]> {
        self.attributes
            .iter()
            .find(|(k, _)| k == &attribute.as_bytes())
            .map(|&(_, v)| v)
    }
}

/// Parse one line of a GTF or GFF3 file into a `RawRecord<'a>`. The
/// record will borrow slices from the input line.
pub fn parse_annotation_line(
    line: &[u8],
    format: AnnotationFormat,
) -> IResult<&[u8], RawRecord<'_>> {
    let attributes: fn(&[u8]) -> IResult<&[u8], AttrVec<'_>> = match format {
        AnnotationFormat::Gtf => gtf_attributes,
        AnnotationFormat::Gff => gff_attributes,
    };

    let fields = tuple((
        is_not("\t\r\n "), // seq_id
        char('\t'),
        is_not("\t\r\n "), // source
        char('\t'),
        is_not("\t\r\n "), // feature type
        char('\t'),
        parse_u64, // start
        char('\t'),
        parse_u64, // end
        char('\t'),
        score, // score
        char('\t'),
        is_not("\t\r\n "), // strand
        char('\t'),
        is_not("\t\r\n "), // frame
        char('\t'),
        attributes,
    ));

    let v = map_res(fields, convert_to_record);
    all_consuming(v)(line)
}

/// convert ascii byte slice contain a decimal integer to u64
fn u64_from_str(input: &[u8]) -> Result<u64, ParseIntError> {
    u64::from_str(str::from_utf8(input).unwrap())
}

/// parse an integer from the input
fn parse_u64(input: &[u8]) -> IResult<&[u8], u64> {
    map_res(digit1, u64_from_str)(input)
}

/// return None unconditionally
fn empty_f64_option(_: &[u8]) -> Result<Option<f64>, ParseFloatError> {
    Ok(None)
}

fn f64_option(input: &[u8]) -> Result<Option<f64>, ParseFloatError> {
    f64::from_str(str::from_utf8(input).unwrap()).map(Some)
}

/// parse a score field to Option<f64>. An empty field '.',
/// will return None, otherwise Some(f64).
fn score(input: &[u8]) -> IResult<&[u8], Option<f64>> {
    alt((
        map_res(tag("."), empty_f64_option),
        map_res(nom::number::complete::recognize_float, f64_option),
    ))(input)
}

/// Is character a valid token for a GTF attribute key or unquoted value
#[inline]
fn is_gtf_token(c: u8) -> bool {
    !matches!(c,
        128..=255 |
        0..=31 |
        b' ' |
        b'"' |
        b'(' | b')' |
        b',' |
        b'/' |
        b':' |
        b';' |
        b'<' |
        b'=' |
        b'>' |
        b'?' |
        b'@' |
        b'[' |
        b'\\' |
        b']' |
        b'{' | b'}'
    )
}

/// Is character a valid token for a GFF3 attribute key
#[inline]
fn is_gff_key_token(c: u8) -> bool {
    !matches!(c, 0..=31 | b'=' | b';')
}

/// Is character a valid token for a GFF3 attribute value. Values may
/// carry commas (multi-valued attributes) and colons (composite ids
/// such as `transcript:ENST...`), and may be empty.
#[inline]
fn is_gff_value_token(c: u8) -> bool {
    !matches!(c, b'\t' | b'\r' | b'\n' | b';')
}

pub type AttrVec<'a> = SmallVec<[(&'a [u8], &'a [u8]); 16]>;

/// GTF attribute grammar: `key "value"; key value; ...` with an
/// optional trailing separator.
fn gtf_attributes(input: &[u8]) -> IResult<&[u8], AttrVec<'_>> {
    terminated(
        separated_list_smallvec(
            pair(tag(";"), take_while1(|c| c == b' ')),
            separated_pair(
                take_while1(is_gtf_token),
                take_while1(|c| c == b' '),
                alt((
                    delimited(char('"'), take_until("\""), char('"')),
                    take_while1(is_gtf_token),
                )),
            ),
        ),
        opt(pair(opt(tag(";")), take_while(|c| c == b' '))),
    )(input)
}

/// GFF3 attribute grammar: `key=value;key=value` with an optional
/// trailing separator. Empty values are allowed.
fn gff_attributes(input: &[u8]) -> IResult<&[u8], AttrVec<'_>> {
    terminated(
        separated_list_smallvec(
            pair(tag(";"), take_while(|c| c == b' ')),
            separated_pair(
                take_while1(is_gff_key_token),
                char('='),
                take_while(is_gff_value_token),
            ),
        ),
        opt(pair(opt(tag(";")), take_while(|c| c == b' '))),
    )(input)
}

/// raw fields of an annotation line, separated by tab characters.
/// this is used transiently and will be converted to a `RawRecord<'a>`.
type RecInnerSep<'a> = (
    &'a [u8],
    char,
    &'a [u8],
    char,
    &'a [u8],
    char,
    u64,
    char,
    u64,
    char,
    Option<f64>,
    char,
    &'a [u8],
    char,
    &'a [u8],
    char,
    AttrVec<'a>,
);

fn convert_to_record(inp: RecInnerSep<'_>) -> Result<RawRecord<'_>, ParseFloatError> {
    Ok(RawRecord {
        seq_id: inp.0,
        source: inp.2,
        feature_type: inp.4,
        start: inp.6,
        end: inp.8,
        score: inp.10,
        strand: inp.12,
        frame: inp.14,
        attributes: inp.16,
    })
}

/// Replacement for `separated_list` in nom, that returns items in a `SmallVec`
/// to avoid allocations in the tight inner loop of attribute parsing.
fn separated_list_smallvec<I, O, O2, E, F, G>(
    mut sep: G,
    mut f: F,
) -> impl FnMut(I) -> IResult<I, SmallVec<[O; 16]>, E>
where
    I: Clone + PartialEq,
    F: FnMut(I) -> IResult<I, O, E>,
    G: FnMut(I) -> IResult<I, O2, E>,
    E: ParseError<I>,
{
    use nom::Err;

    move |mut i: I| {
        let mut res = SmallVec::new();

        match f(i.clone()) {
            Err(Err::Error(_)) => return Ok((i, res)),
            Err(e) => return Err(e),
            Ok((i1, o)) => {
                if i1 == i {
                    return Err(Err::Error(E::from_error_kind(i1, ErrorKind::SeparatedList)));
                }

                res.push(o);
                i = i1;
            }
        }

        loop {
            match sep(i.clone()) {
                Err(Err::Error(_)) => return Ok((i, res)),
                Err(e) => return Err(e),
                Ok((i1, _)) => {
                    if i1 == i {
                        return Err(Err::Error(E::from_error_kind(i1, ErrorKind::SeparatedList)));
                    }

                    match f(i1.clone()) {
                        Err(Err::Error(_)) => return Ok((i, res)),
                        Err(e) => return Err(e),
                        Ok((i2, o)) => {
                            if i2 == i {
                                return Err(Err::Error(E::from_error_kind(
                                    i2,
                                    ErrorKind::SeparatedList,
                                )));
                            }

                            res.push(o);
                            i = i2;
                        }
                    }
                }
            }
        }
    }
}

/// Check that a line of an annotation file is valid.
/// This function is intended to be used on a line that failed parsing in order
/// to provide a user-facing error message.
pub fn validate_annotation_line(line: &[u8], format: AnnotationFormat) -> Result<()> {
    let pieces: Vec<_> = line.split(|c| *c == b'\t').collect();
    ensure!(
        pieces.len() == 9,
        "expected 9 tab-separated elements but found {}",
        pieces.len()
    );
    let validate_attributes = match format {
        AnnotationFormat::Gtf => validate_gtf_attributes,
        AnnotationFormat::Gff => validate_gff_attributes,
    };
    #[allow(clippy::type_complexity)]
    let validators: [(&str, fn(&[u8]) -> Result<()>); 9] = [
        ("seq_id", validate_no_space),
        ("source", validate_no_space),
        ("feature", validate_no_space),
        ("start", validate_u64),
        ("end", validate_u64),
        ("score", validate_score),
        ("strand", validate_no_space),
        ("frame", validate_no_space),
        ("attributes", validate_attributes),
    ];
    for (piece, (item_name, validator)) in std::iter::zip(pieces, validators) {
        if let Err(err) = validator(piece) {
            bail!("{item_name}: {err}");
        }
    }
    Ok(())
}

fn validate_no_space(input: &[u8]) -> Result<()> {
    ensure!(!input.iter().any(|c| *c == b' '), "cannot contain spaces");
    Ok(())
}

fn validate_u64(input: &[u8]) -> Result<()> {
    let input_str = str::from_utf8(input).map_err(|_| anyhow!("invalid UTF-8 character(s)"))?;
    u64::from_str(input_str).map_err(|_| anyhow!("expected an integer, not \"{input_str}\""))?;
    Ok(())
}

fn validate_score(input: &[u8]) -> Result<()> {
    score(input).map_err(|_| anyhow!("expected \".\" or a number"))?;
    Ok(())
}

fn validate_gtf_attributes(input: &[u8]) -> Result<()> {
    all_consuming(gtf_attributes)(input).map_err(|_| anyhow!("invalid attributes format"))?;
    Ok(())
}

fn validate_gff_attributes(input: &[u8]) -> Result<()> {
    all_consuming(gff_attributes)(input).map_err(|_| anyhow!("invalid attributes format"))?;
    Ok(())
}

#[cfg(test)]
mod test {
    use super::*;

    const GTF_EXON: &[u8] = br#"1	havana	exon	29554	30039	.	+	.	gene_id "ENSG00000243485"; transcript_id "ENST00000473358"; exon_number "1"; gene_name "MIR1302-2HG""#;
    const GTF_NO_QUOTES: &[u8] = br#"1	havana	exon	29554	30039	.	+	.	gene_id ENSG00000243485; transcript_id "ENST00000473358"; exon_number "1"; gene_name "MIR1302-2HG""#;
    const GTF_TRAILING_SEMI_SPACE: &[u8] = br#"1	havana	gene	29554	31109	.	+	.	gene_id "ENSG00000243485"; gene_name "RP11-34P13.3"; "#;
    const GTF_SPACE_IN_FIELD: &[u8] = br#" 1	havana	exon	29554	30039	.	+	.	gene_id "ENSG00000243485""#;
    const GFF_TRANSCRIPT: &[u8] =
        b"6\tensembl\ttranscript\t17281185\t17289115\t.\t+\t.\tID=ENSMUST1;Parent=ENSMUSG1";
    const GFF_COMPOSITE_PARENT: &[u8] =
        b"6\tensembl\texon\t17281185\t17281500\t.\t+\t.\tParent=transcript:6:ENSMUST1;rank=1";
    const GFF_EMPTY_VALUE: &[u8] = b"6\tensembl\tgene\t100\t200\t.\t-\t.\tID=ENSMUSG1;Note=";
    const GFF_BAD_START: &[u8] = b"6\tensembl\tgene\tabc\t200\t.\t-\t.\tID=ENSMUSG1";

    #[test]
    fn gtf_quoting_is_optional() {
        let quoted = parse_annotation_line(GTF_EXON, AnnotationFormat::Gtf);
        let unquoted = parse_annotation_line(GTF_NO_QUOTES, AnnotationFormat::Gtf);
        assert_eq!(quoted, unquoted);
        let (_, rec) = quoted.unwrap();
        assert_eq!(rec.attr("gene_id"), Some(&b"ENSG00000243485"[..]));
        assert_eq!(rec.attr("nonexistent"), None);
    }

    #[test]
    fn gtf_trailing_separator() {
        assert!(parse_annotation_line(GTF_TRAILING_SEMI_SPACE, AnnotationFormat::Gtf).is_ok());
    }

    #[test]
    fn leading_space_rejected_with_readable_message() {
        assert!(parse_annotation_line(GTF_SPACE_IN_FIELD, AnnotationFormat::Gtf).is_err());
        assert_eq!(
            validate_annotation_line(GTF_SPACE_IN_FIELD, AnnotationFormat::Gtf)
                .unwrap_err()
                .to_string(),
            "seq_id: cannot contain spaces"
        );
    }

    #[test]
    fn gff_attributes_parse() {
        let (_, rec) = parse_annotation_line(GFF_TRANSCRIPT, AnnotationFormat::Gff).unwrap();
        assert_eq!(rec.feature_type, b"transcript");
        assert_eq!(rec.start, 17281185);
        assert_eq!(rec.end, 17289115);
        assert_eq!(rec.attr("ID"), Some(&b"ENSMUST1"[..]));
        assert_eq!(rec.attr("Parent"), Some(&b"ENSMUSG1"[..]));
    }

    #[test]
    fn gff_value_may_contain_colons() {
        let (_, rec) = parse_annotation_line(GFF_COMPOSITE_PARENT, AnnotationFormat::Gff).unwrap();
        assert_eq!(rec.attr("Parent"), Some(&b"transcript:6:ENSMUST1"[..]));
    }

    #[test]
    fn gff_empty_value() {
        let (_, rec) = parse_annotation_line(GFF_EMPTY_VALUE, AnnotationFormat::Gff).unwrap();
        assert_eq!(rec.attr("Note"), Some(&b""[..]));
    }

    #[test]
    fn bad_coordinate_is_named_by_validator() {
        assert!(parse_annotation_line(GFF_BAD_START, AnnotationFormat::Gff).is_err());
        assert_eq!(
            validate_annotation_line(GFF_BAD_START, AnnotationFormat::Gff)
                .unwrap_err()
                .to_string(),
            "start: expected an integer, not \"abc\""
        );
    }

    #[test]
    fn format_from_str() {
        assert_eq!("gtf".parse::<AnnotationFormat>().unwrap(), AnnotationFormat::Gtf);
        assert_eq!("GFF".parse::<AnnotationFormat>().unwrap(), AnnotationFormat::Gff);
        assert_eq!("gff3".parse::<AnnotationFormat>().unwrap(), AnnotationFormat::Gff);
        assert!("bed".parse::<AnnotationFormat>().is_err());
    }
}

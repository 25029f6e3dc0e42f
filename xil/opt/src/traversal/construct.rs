use super::Visitor;
use itertools::Itertools;
use linked_hash_map::LinkedHashMap;
use std::fmt;
use xil_ir as ir;
use xil_utils::{OutputFile, XilResult};

/// The value of a pass option.
#[derive(Clone, Debug, PartialEq)]
pub enum ParseVal {
    Bool(bool),
    Num(i64),
    /// `-`, `<err>`, `<null>` or a file name.
    OutStream(OutputFile),
}

impl ParseVal {
    /// # Panics
    /// If the option is not a flag. Options are declared by the pass reading
    /// them, so a mismatch is a bug in that pass.
    pub fn bool(&self) -> bool {
        match self {
            ParseVal::Bool(b) => *b,
            other => panic!("option is not a flag: {other}"),
        }
    }

    /// # Panics
    /// If the option is not a number.
    pub fn num(&self) -> i64 {
        match self {
            ParseVal::Num(n) => *n,
            other => panic!("option is not a number: {other}"),
        }
    }

    /// The number, unless it is negative.
    pub fn pos_num(&self) -> Option<u64> {
        u64::try_from(self.num()).ok()
    }

    /// The stream, unless it discards everything written to it.
    ///
    /// # Panics
    /// If the option is not a stream.
    pub fn not_null_outstream(&self) -> Option<OutputFile> {
        match self {
            ParseVal::OutStream(OutputFile::Null) => None,
            ParseVal::OutStream(out) => Some(out.clone()),
            other => panic!("option is not an output stream: {other}"),
        }
    }
}

impl fmt::Display for ParseVal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ParseVal::Bool(b) => write!(f, "{b}"),
            ParseVal::Num(n) => write!(f, "{n}"),
            ParseVal::OutStream(out) => write!(f, "{out}"),
        }
    }
}

/// An option a pass accepts as `pass:name=value`, or as `pass:name` for
/// flags.
pub struct PassOpt {
    name: &'static str,
    description: &'static str,
    default: ParseVal,
    parse: fn(&str) -> Option<ParseVal>,
}

impl PassOpt {
    pub const fn new(
        name: &'static str,
        description: &'static str,
        default: ParseVal,
        parse: fn(&str) -> Option<ParseVal>,
    ) -> Self {
        Self {
            name,
            description,
            default,
            parse,
        }
    }

    pub const fn name(&self) -> &'static str {
        self.name
    }

    pub const fn description(&self) -> &'static str {
        self.description
    }

    pub const fn default(&self) -> &ParseVal {
        &self.default
    }

    pub fn parse_bool(s: &str) -> Option<ParseVal> {
        s.parse::<bool>().ok().map(ParseVal::Bool)
    }

    pub fn parse_num(s: &str) -> Option<ParseVal> {
        s.parse::<i64>().ok().map(ParseVal::Num)
    }

    pub fn parse_outstream(s: &str) -> Option<ParseVal> {
        s.parse::<OutputFile>().ok().map(ParseVal::OutStream)
    }
}

/// Static description of a pass. Separate from [Visitor] so that a pass can
/// be described without constructing it.
pub trait Named {
    /// Unique name of the pass, used in plans and options.
    fn name() -> &'static str;
    fn description() -> &'static str;
    fn opts() -> Vec<PassOpt> {
        vec![]
    }
}

/// Builds a pass from the options in a [ir::Context]. Passes without
/// options get this from [Default].
pub trait ConstructVisitor {
    /// Every option of the pass, in declaration order. Values given in
    /// [ir::Context::extra_opts] win over defaults, and a later value wins
    /// over an earlier one. Unknown options and unparsable values are
    /// logged and ignored.
    fn get_opts(ctx: &ir::Context) -> LinkedHashMap<&'static str, ParseVal>
    where
        Self: Named,
    {
        let pass = Self::name();
        let declared = Self::opts();
        let mut given: LinkedHashMap<&'static str, ParseVal> = LinkedHashMap::new();
        for raw in &ctx.extra_opts {
            let Some((target, setting)) = raw.split_once(':') else {
                continue;
            };
            if target != pass {
                continue;
            }
            let (key, value) = match setting.split_once('=') {
                Some((key, value)) => (key, Some(value)),
                None => (setting, None),
            };
            let Some(opt) = declared.iter().find(|o| o.name == key) else {
                log::warn!("{pass}: unknown option `{key}'");
                continue;
            };
            let parsed = match value {
                None => Some(ParseVal::Bool(true)),
                Some(value) => (opt.parse)(value),
            };
            match parsed {
                Some(v) => {
                    given.insert(opt.name, v);
                }
                None => log::warn!(
                    "{pass}: `{}' is not a valid value for `{key}'",
                    value.unwrap_or_default()
                ),
            }
        }

        let values = declared
            .into_iter()
            .map(|opt| {
                let value = given.remove(&opt.name).unwrap_or(opt.default);
                (opt.name, value)
            })
            .collect::<LinkedHashMap<_, _>>();
        log::debug!(
            "{pass} options: {}",
            values.iter().map(|(k, v)| format!("{k}={v}")).join(" ")
        );
        values
    }

    fn from(ctx: &ir::Context) -> XilResult<Self>
    where
        Self: Sized;

    /// Reset per-function state. [Visitor::do_pass] calls this after every
    /// function.
    fn clear_data(&mut self);
}

impl<T: Default + Visitor> ConstructVisitor for T {
    fn from(_ctx: &ir::Context) -> XilResult<Self> {
        Ok(T::default())
    }

    fn clear_data(&mut self) {
        *self = T::default();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Knobs;

    impl Named for Knobs {
        fn name() -> &'static str {
            "knobs"
        }

        fn description() -> &'static str {
            "a pass with options"
        }

        fn opts() -> Vec<PassOpt> {
            vec![
                PassOpt::new("flag", "a flag", ParseVal::Bool(false), PassOpt::parse_bool),
                PassOpt::new("limit", "a number", ParseVal::Num(8), PassOpt::parse_num),
                PassOpt::new(
                    "log",
                    "a stream",
                    ParseVal::OutStream(OutputFile::Null),
                    PassOpt::parse_outstream,
                ),
            ]
        }
    }

    impl ConstructVisitor for Knobs {
        fn from(_ctx: &ir::Context) -> XilResult<Self> {
            Ok(Knobs)
        }

        fn clear_data(&mut self) {}
    }

    fn ctx(opts: &[&str]) -> ir::Context {
        let mut ctx = ir::Context::new();
        ctx.extra_opts = opts.iter().map(|s| s.to_string()).collect();
        ctx
    }

    #[test]
    fn options_and_defaults() {
        let opts = Knobs::get_opts(&ctx(&[
            "knobs:flag",
            "other:limit=3",
            "knobs:limit=2",
            "knobs:limit=5",
        ]));
        assert!(opts["flag"].bool());
        assert_eq!(opts["limit"].num(), 5);
        assert!(opts["log"].not_null_outstream().is_none());
        assert_eq!(opts.keys().copied().collect::<Vec<_>>(), ["flag", "limit", "log"]);
    }

    #[test]
    fn invalid_values_fall_back_to_defaults() {
        let opts = Knobs::get_opts(&ctx(&["knobs:limit=lots", "knobs:unknown=1", "knobs"]));
        assert_eq!(opts["limit"].num(), 8);
        assert_eq!(opts.len(), 3);
        assert_eq!(ParseVal::Num(-1).pos_num(), None);
        assert_eq!(ParseVal::Bool(true).to_string(), "true");
    }
}

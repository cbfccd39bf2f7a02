use nom::{
    branch::alt,
    bytes::complete::{tag_no_case, take_until, take_while1},
    character::complete::{char, digit1, multispace0, multispace1},
    combinator::{map_res, opt, recognize},
    sequence::{delimited, preceded, separated_pair, tuple},
    IResult,
};

/// Operator console commands.
#[derive(Debug, PartialEq, Clone)]
pub enum Command {
    Token(String),
    Resolution(String),
    NewFaces { at: Option<i64>, limit: Option<i64> },
    Discover { at: Option<i64>, limit: Option<i64>, age: Option<(i32, i32)>, distance: Option<i32> },
    Lmm { at: Option<i64> },
    Lmhis { at: Option<i64> },
    Lc { at: Option<i64>, source: Option<String> },
    Chat { user_id: String, at: Option<i64> },
    Help,
    Exit,
}

// --- BASIC PARSERS ---

fn parse_i64(input: &str) -> IResult<&str, i64> {
    map_res(recognize(tuple((opt(char('-')), digit1))), |s: &str| s.parse::<i64>())(input)
}

fn parse_i32(input: &str) -> IResult<&str, i32> {
    map_res(digit1, |s: &str| s.parse::<i32>())(input)
}

fn parse_quoted(input: &str) -> IResult<&str, String> {
    let (input, content) = delimited(char('\''), take_until("'"), char('\''))(input)?;
    Ok((input, content.to_string()))
}

fn parse_word(input: &str) -> IResult<&str, &str> {
    take_while1(|c: char| c.is_ascii_alphanumeric() || c == '_')(input)
}

// --- HELPERS ---
fn ws<'a, F, O, E: nom::error::ParseError<&'a str>>(inner: F) -> impl FnMut(&'a str) -> IResult<&'a str, O, E>
where F: FnMut(&'a str) -> IResult<&'a str, O, E> {
    delimited(multispace0, inner, multispace0)
}

fn tag_ci(t: &'static str) -> impl FnMut(&str) -> IResult<&str, &str> {
    move |input| tag_no_case(t)(input)
}

fn at_clause(input: &str) -> IResult<&str, Option<i64>> {
    opt(preceded(ws(tag_ci("AT")), parse_i64))(input)
}

fn limit_clause(input: &str) -> IResult<&str, Option<i64>> {
    opt(preceded(ws(tag_ci("LIMIT")), parse_i64))(input)
}

// --- COMMAND PARSERS ---

fn parse_token(input: &str) -> IResult<&str, Command> {
    let (input, _) = tag_ci("TOKEN")(input)?;
    let (input, _) = multispace1(input)?;
    let (input, token) = parse_quoted(input)?;
    Ok((input, Command::Token(token)))
}

fn parse_resolution(input: &str) -> IResult<&str, Command> {
    let (input, _) = tag_ci("RES")(input)?;
    let (input, _) = multispace1(input)?;
    let (input, res) = recognize(separated_pair(digit1, char('x'), digit1))(input)?;
    Ok((input, Command::Resolution(res.to_string())))
}

fn parse_new_faces(input: &str) -> IResult<&str, Command> {
    let (input, _) = tag_ci("NEWFACES")(input)?;
    let (input, at) = at_clause(input)?;
    let (input, limit) = limit_clause(input)?;
    Ok((input, Command::NewFaces { at, limit }))
}

fn parse_discover(input: &str) -> IResult<&str, Command> {
    let (input, _) = tag_ci("DISCOVER")(input)?;
    let (input, at) = at_clause(input)?;
    let (input, limit) = limit_clause(input)?;
    let (input, age) = opt(preceded(
        ws(tag_ci("AGE")),
        separated_pair(parse_i32, char('-'), parse_i32),
    ))(input)?;
    let (input, distance) = opt(preceded(ws(tag_ci("DIST")), parse_i32))(input)?;
    Ok((input, Command::Discover { at, limit, age, distance }))
}

fn parse_lmhis(input: &str) -> IResult<&str, Command> {
    let (input, _) = tag_ci("LMHIS")(input)?;
    let (input, at) = at_clause(input)?;
    Ok((input, Command::Lmhis { at }))
}

fn parse_lmm(input: &str) -> IResult<&str, Command> {
    let (input, _) = tag_ci("LMM")(input)?;
    let (input, at) = at_clause(input)?;
    Ok((input, Command::Lmm { at }))
}

fn parse_lc(input: &str) -> IResult<&str, Command> {
    let (input, _) = tag_ci("LC")(input)?;
    let (input, at) = at_clause(input)?;
    let (input, source) = opt(preceded(ws(tag_ci("SOURCE")), parse_word))(input)?;
    Ok((input, Command::Lc { at, source: source.map(str::to_string) }))
}

fn parse_chat(input: &str) -> IResult<&str, Command> {
    let (input, _) = tag_ci("CHAT")(input)?;
    let (input, _) = multispace1(input)?;
    let (input, user_id) = parse_quoted(input)?;
    let (input, at) = at_clause(input)?;
    Ok((input, Command::Chat { user_id, at }))
}

fn parse_help(input: &str) -> IResult<&str, Command> {
    let (input, _) = tag_ci("HELP")(input)?;
    Ok((input, Command::Help))
}

fn parse_exit(input: &str) -> IResult<&str, Command> {
    let (input, _) = alt((tag_ci("EXIT"), tag_ci("QUIT")))(input)?;
    Ok((input, Command::Exit))
}

pub fn parse_command(input: &str) -> Result<Command, String> {
    let input = input.trim();
    let result = alt((
        parse_token,
        parse_resolution,
        parse_new_faces,
        parse_discover,
        parse_lmhis,
        parse_lmm,
        parse_lc,
        parse_chat,
        parse_help,
        parse_exit,
    ))(input);

    match result {
        Ok((remainder, cmd)) => {
            if !remainder.trim().is_empty() {
                return Err(format!("Unexpected tokens at end: '{}'", remainder));
            }
            Ok(cmd)
        },
        Err(nom::Err::Error(e)) | Err(nom::Err::Failure(e)) => {
            let context: String = e.input.chars().take(20).collect();
            if context.len() < e.input.len() {
                Err(format!("Invalid syntax near: '{}...'", context))
            } else {
                Err(format!("Invalid syntax near: '{}'", context))
            }
        },
        Err(nom::Err::Incomplete(_)) => Err("Incomplete command.".to_string()),
    }
}

//! Tokenizer for the derived-PEG formula grammar (spec §4.2).

#[derive(Debug, Clone, PartialEq)]
pub enum Token {
    Num(f64),
    Ident(String),
    Plus,
    Minus,
    Star,
    Slash,
    LParen,
    RParen,
    End,
}

#[derive(Debug, Clone, PartialEq)]
pub struct LexError(pub String);

pub fn tokenize(input: &str) -> Result<Vec<Token>, LexError> {
    let chars: Vec<char> = input.chars().collect();
    let mut tokens = Vec::new();
    let mut i = 0;

    while i < chars.len() {
        let c = chars[i];
        if c.is_whitespace() {
            i += 1;
            continue;
        }
        match c {
            '+' => {
                tokens.push(Token::Plus);
                i += 1;
            },
            '-' => {
                tokens.push(Token::Minus);
                i += 1;
            },
            '*' => {
                tokens.push(Token::Star);
                i += 1;
            },
            '/' => {
                tokens.push(Token::Slash);
                i += 1;
            },
            '(' => {
                tokens.push(Token::LParen);
                i += 1;
            },
            ')' => {
                tokens.push(Token::RParen);
                i += 1;
            },
            c if c.is_ascii_digit() || c == '.' => {
                let start = i;
                let mut seen_dot = c == '.';
                i += 1;
                while i < chars.len() {
                    let c = chars[i];
                    if c.is_ascii_digit() {
                        i += 1;
                    } else if c == '.' && !seen_dot {
                        seen_dot = true;
                        i += 1;
                    } else if (c == 'e' || c == 'E')
                        && i + 1 < chars.len()
                        && (chars[i + 1].is_ascii_digit()
                            || ((chars[i + 1] == '+' || chars[i + 1] == '-')
                                && i + 2 < chars.len()
                                && chars[i + 2].is_ascii_digit()))
                    {
                        i += 2;
                        while i < chars.len() && chars[i].is_ascii_digit() {
                            i += 1;
                        }
                    } else {
                        break;
                    }
                }
                let text: String = chars[start..i].iter().collect();
                let num: f64 = text
                    .parse()
                    .map_err(|_| LexError(format!("invalid numeric literal '{text}'")))?;
                tokens.push(Token::Num(num));
            },
            c if c.is_ascii_alphabetic() || c == '_' => {
                let start = i;
                i += 1;
                while i < chars.len() && (chars[i].is_ascii_alphanumeric() || chars[i] == '_' || chars[i] == '.') {
                    i += 1;
                }
                let text: String = chars[start..i].iter().collect();
                tokens.push(Token::Ident(text));
            },
            other => {
                return Err(LexError(format!("unsupported character '{other}'")));
            },
        }
    }
    tokens.push(Token::End);
    Ok(tokens)
}

//! Recursive-descent parser for the relevance filter's query grammar.
//!
//! ```text
//! Query      := Include ( "ANDNOT" Group )?
//! Include    := Group ( "AND" Group )*
//! Group      := "(" Term ( "OR" Term )* ")" | Term
//! Term       := '"' <any-char-except-quote>+ '"'
//! ```

use super::FilterError;

pub type Term = String;

/// A compiled query: an AND of OR-groups (`required_groups`) plus a flat
/// set of excluded terms (`user_excluded`) from an optional `ANDNOT`
/// clause.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Query {
    pub required_groups: Vec<Vec<Term>>,
    pub user_excluded: Vec<Term>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Token {
    Open,
    Close,
    And,
    Or,
    AndNot,
    Quoted(String),
}

pub fn parse(text: &str) -> Result<Query, FilterError> {
    let trimmed = text.trim();

    if trimmed.starts_with("ANDNOT") {
        return Err(FilterError::StartsWithAndNot);
    }

    let quote_count = trimmed.chars().filter(|&c| c == '"').count();
    if quote_count % 2 != 0 {
        return Err(FilterError::UnbalancedQuotes);
    }

    let mut depth: i32 = 0;
    for c in trimmed.chars() {
        match c {
            '(' => depth += 1,
            ')' => {
                depth -= 1;
                if depth < 0 {
                    return Err(FilterError::UnbalancedParens);
                }
            }
            _ => {}
        }
    }
    if depth != 0 {
        return Err(FilterError::UnbalancedParens);
    }

    let tokens = tokenize(trimmed)?;
    if tokens.is_empty() {
        return Err(FilterError::NoInclusionTerm);
    }

    let mut pos = 0usize;
    let required_groups = parse_include(&tokens, &mut pos)?;

    let user_excluded = if pos < tokens.len() && tokens[pos] == Token::AndNot {
        pos += 1;
        parse_group(&tokens, &mut pos)?
    } else {
        Vec::new()
    };

    if required_groups.iter().all(Vec::is_empty) || required_groups.is_empty() {
        return Err(FilterError::NoInclusionTerm);
    }

    Ok(Query { required_groups, user_excluded })
}

fn tokenize(text: &str) -> Result<Vec<Token>, FilterError> {
    let mut tokens = Vec::new();
    let chars: Vec<char> = text.chars().collect();
    let mut i = 0;

    while i < chars.len() {
        let c = chars[i];
        if c.is_whitespace() {
            i += 1;
            continue;
        }
        if c == '(' {
            tokens.push(Token::Open);
            i += 1;
            continue;
        }
        if c == ')' {
            tokens.push(Token::Close);
            i += 1;
            continue;
        }
        if c == '"' {
            let start = i + 1;
            let mut end = start;
            while end < chars.len() && chars[end] != '"' {
                end += 1;
            }
            let word: String = chars[start..end].iter().collect();
            tokens.push(Token::Quoted(word));
            i = end + 1;
            continue;
        }

        let start = i;
        while i < chars.len() && !chars[i].is_whitespace() && chars[i] != '(' && chars[i] != ')' {
            i += 1;
        }
        let word: String = chars[start..i].iter().collect();
        match word.as_str() {
            "AND" => tokens.push(Token::And),
            "OR" => tokens.push(Token::Or),
            "ANDNOT" => tokens.push(Token::AndNot),
            "XOR" | "NAND" | "NOR" => return Err(FilterError::UnsupportedOperator(word)),
            other => {
                // Bare (unquoted) identifiers are not part of the grammar;
                // ignore them rather than failing, matching the tolerant
                // tokenizing of the original parser.
                if !other.is_empty() {
                    continue;
                }
            }
        }
    }

    Ok(tokens)
}

fn parse_include(tokens: &[Token], pos: &mut usize) -> Result<Vec<Vec<Term>>, FilterError> {
    let mut groups = Vec::new();
    loop {
        let group = parse_group(tokens, pos)?;
        groups.push(group);
        if *pos < tokens.len() && tokens[*pos] == Token::And {
            *pos += 1;
            continue;
        }
        break;
    }
    Ok(groups)
}

fn parse_group(tokens: &[Token], pos: &mut usize) -> Result<Vec<Term>, FilterError> {
    if *pos < tokens.len() && tokens[*pos] == Token::Open {
        *pos += 1;
        let mut terms = Vec::new();
        loop {
            match tokens.get(*pos) {
                Some(Token::Quoted(t)) => {
                    terms.push(t.clone());
                    *pos += 1;
                }
                _ => return Err(FilterError::EmptyGroup),
            }
            if *pos < tokens.len() && tokens[*pos] == Token::Or {
                *pos += 1;
                continue;
            }
            break;
        }
        match tokens.get(*pos) {
            Some(Token::Close) => {
                *pos += 1;
                Ok(terms)
            }
            _ => Err(FilterError::UnbalancedParens),
        }
    } else {
        match tokens.get(*pos) {
            Some(Token::Quoted(t)) => {
                let term = t.clone();
                *pos += 1;
                Ok(vec![term])
            }
            _ => Err(FilterError::EmptyGroup),
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn parses_simple_and_of_ors() {
        let q = parse(r#"("AI" OR "ML") AND ("safety")"#).unwrap();
        assert_eq!(q.required_groups, vec![
            vec!["AI".to_string(), "ML".to_string()],
            vec!["safety".to_string()],
        ]);
        assert!(q.user_excluded.is_empty());
    }

    #[test]
    fn parses_bare_quoted_term_group() {
        let q = parse(r#""alignment""#).unwrap();
        assert_eq!(q.required_groups, vec![vec!["alignment".to_string()]]);
    }

    #[test]
    fn parses_andnot_clause() {
        let q = parse(r#"("AI") ANDNOT ("spam" OR "ads")"#).unwrap();
        assert_eq!(q.user_excluded, vec!["spam".to_string(), "ads".to_string()]);
    }

    #[test]
    fn rejects_unsupported_operator() {
        assert_eq!(
            parse(r#"("AI") XOR ("ML")"#),
            Err(FilterError::UnsupportedOperator("XOR".to_string()))
        );
    }

    #[test]
    fn rejects_empty_group() {
        assert_eq!(parse(r#"() AND ("safety")"#), Err(FilterError::EmptyGroup));
    }
}

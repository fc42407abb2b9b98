//! Token sets produced by tokenizing a translation unit.

use crate::chain::Anchor;
use crate::error::{Error, Result};
use crate::file::owned_string;
use crate::resource::Resource;
use std::ffi::{c_int, c_uint};
use std::fmt;
use std::ptr;
use tether_native::*;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TokenKind {
    Punctuation,
    Keyword,
    Identifier,
    Literal,
}

impl TokenKind {
    #[must_use]
    pub fn from_raw(raw: c_int) -> Option<Self> {
        match raw {
            TX_TOKEN_PUNCTUATION => Some(TokenKind::Punctuation),
            TX_TOKEN_KEYWORD => Some(TokenKind::Keyword),
            TX_TOKEN_IDENTIFIER => Some(TokenKind::Identifier),
            TX_TOKEN_LITERAL => Some(TokenKind::Literal),
            _ => None,
        }
    }
}

#[derive(Clone, Copy)]
struct TokenBuffer {
    tu: TxTranslationUnit,
    tokens: *mut TxToken,
    count: c_uint,
}

fn dispose_buffer(buffer: TokenBuffer) {
    unsafe { tx_dispose_tokens(buffer.tu, buffer.tokens, buffer.count) };
}

/// The tokens of a translation unit, in a buffer owned by native code.
///
/// The buffer is released when the set is disposed and every [`Token`] taken
/// from it is gone. The translation unit cannot be released before that.
pub struct TokenSet {
    handle: Resource<TokenBuffer>,
    len: usize,
}

impl TokenSet {
    pub(crate) fn tokenize(tu: &Resource<TxTranslationUnit>) -> Result<Self> {
        let unit = tu.borrow()?;
        let mut tokens = ptr::null_mut();
        let mut count: c_uint = 0;
        unsafe { tx_tokenize(unit.get(), &mut tokens, &mut count) };

        let buffer = TokenBuffer {
            tu: unit.get(),
            tokens,
            count,
        };
        Ok(TokenSet {
            handle: Resource::new("TokenSet", buffer, dispose_buffer, Some(&tu.anchor()))?,
            len: count as usize,
        })
    }

    /// Number of tokens. Fixed at tokenization, so it stays readable after
    /// the set is disposed.
    #[must_use]
    pub fn len(&self) -> usize {
        self.len
    }

    /// Whether the unit had no tokens. An empty set holds no native buffer.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// The token at `index`.
    ///
    /// # Errors
    ///
    /// [`Error::IndexOutOfRange`] past the end, [`Error::ObjectDisposed`] if
    /// the set or its translation unit is disposed.
    pub fn get(&self, index: usize) -> Result<Token> {
        if index >= self.len {
            return Err(Error::IndexOutOfRange { index, len: self.len });
        }
        let buffer = self.handle.borrow()?;
        let buffer = buffer.get();
        // SAFETY: the borrow keeps the buffer alive and `index` is in bounds.
        let token = unsafe { *buffer.tokens.add(index) };
        Token::new(TokenRef { tu: buffer.tu, token }, &self.handle.anchor())
    }

    /// Every token, in source order.
    pub fn tokens(&self) -> Result<Vec<Token>> {
        (0..self.len).map(|index| self.get(index)).collect()
    }

    /// See [`Resource::dispose`].
    #[track_caller]
    pub fn dispose(&self) {
        self.handle.dispose();
    }

    /// See [`Resource::try_dispose`].
    pub fn try_dispose(&self) -> Result<()> {
        self.handle.try_dispose()
    }

    #[must_use]
    pub fn is_disposed(&self) -> bool {
        self.handle.is_disposed()
    }

    #[must_use]
    pub fn anchor(&self) -> Anchor {
        self.handle.anchor()
    }
}

impl fmt::Debug for TokenSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TokenSet")
            .field("len", &self.len)
            .field("handle", &self.handle)
            .finish()
    }
}

#[derive(Clone, Copy)]
struct TokenRef {
    tu: TxTranslationUnit,
    token: TxToken,
}

/// One token of a [`TokenSet`]. Usable while the set and its translation
/// unit are.
pub struct Token {
    handle: Resource<TokenRef>,
}

impl Token {
    fn new(token: TokenRef, owner: &Anchor) -> Result<Self> {
        Ok(Token {
            handle: Resource::reference("Token", token, owner)?,
        })
    }

    pub fn kind(&self) -> Result<Option<TokenKind>> {
        let token = self.handle.borrow()?;
        Ok(TokenKind::from_raw(token.get().token.kind))
    }

    pub fn spelling(&self) -> Result<String> {
        let token = self.handle.borrow()?;
        let TokenRef { tu, token } = token.get();
        Ok(unsafe { owned_string(tx_token_spelling(tu, token)) })
    }

    /// Line and column of the token's first character.
    pub fn position(&self) -> Result<(u32, u32)> {
        let token = self.handle.borrow()?;
        let raw = token.get().token;
        Ok((raw.line, raw.column))
    }

    #[must_use]
    pub fn is_valid(&self) -> bool {
        self.handle.is_usable()
    }
}

impl fmt::Debug for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut out = f.debug_struct("Token");
        if let Ok(spelling) = self.spelling() {
            out.field("spelling", &spelling);
        }
        out.field("valid", &self.is_valid()).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_token_kind_translation() {
        assert_eq!(TokenKind::from_raw(TX_TOKEN_KEYWORD), Some(TokenKind::Keyword));
        assert_eq!(TokenKind::from_raw(TX_TOKEN_LITERAL), Some(TokenKind::Literal));
        assert_eq!(TokenKind::from_raw(-1), None);
    }
}

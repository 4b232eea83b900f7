/// A vocabulary token id. The newtype keeps token ids from mixing with the
/// plain `i32`s that the size-probe conventions also traffic in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Token(pub i32);

impl Token {
    #[inline]
    pub fn raw(self) -> i32 {
        self.0
    }
}

impl From<i32> for Token {
    #[inline]
    fn from(value: i32) -> Self {
        Token(value)
    }
}

impl From<Token> for i32 {
    #[inline]
    fn from(token: Token) -> i32 {
        token.0
    }
}

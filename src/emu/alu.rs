use crate::plat::{AluOp, CmpOp};

impl AluOp {
    /// Computes `left (op) right`. Results wrap modulo 256; shift counts behave like a
    /// 32-bit shift, so anything from 8 to 31 clears the register.
    pub fn apply(self, left: u8, right: u8) -> u8 {
        let (l, r) = (u32::from(left), u32::from(right));
        let result = match self {
            Self::And => l & r,
            Self::Or => l | r,
            Self::Xor => l ^ r,
            Self::Shl => l.wrapping_shl(r),
            Self::Shr => l.wrapping_shr(r),
            Self::Add => l.wrapping_add(r),
            Self::Sub => l.wrapping_sub(r),
        };
        (result & 0xff) as u8
    }
}

impl CmpOp {
    pub fn test(self, left: u8, right: u8) -> bool {
        match self {
            Self::Eq => left == right,
            Self::Ne => left != right,
            Self::Lt => left < right,
            Self::Le => left <= right,
            Self::Gt => left > right,
            Self::Ge => left >= right,
        }
    }
}

pub mod arithmetic;
pub mod between;
pub mod comparison;
pub mod in_list;
pub mod is_null;
pub mod like;
pub mod logical;

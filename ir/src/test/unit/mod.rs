mod constructors;
mod expr;
mod tensor;

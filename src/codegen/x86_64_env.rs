pub trait Env {
    const ENTRY_POINT: &str;

    const GLOBAL_PROLOGUE: &str;

    const SECTION_TEXT: &str;
    const SECTION_READ_ONLY_DATA: &str;
    const SECTION_DATA: &str;

    /// Call operand for the C runtime's `printf`.
    const PRINTF: &str;
    /// Call operand for the C runtime's `fmod`.
    const FMOD: &str;
}

impl Env for Darwin {
    const ENTRY_POINT: &str = "_main";

    const GLOBAL_PROLOGUE: &str = ".intel_syntax noprefix\n\n";

    const SECTION_TEXT: &str = "__TEXT,__text,regular,pure_instructions";
    const SECTION_READ_ONLY_DATA: &str = "__TEXT,__const";
    const SECTION_DATA: &str = "__DATA,__data";

    const PRINTF: &str = "_printf";
    const FMOD: &str = "_fmod";
}

impl Env for Linux {
    const ENTRY_POINT: &str = "main";

    const GLOBAL_PROLOGUE: &str = concat!(
        ".intel_syntax noprefix\n",
        ".section .note.GNU-stack,\"\",@progbits\n\n",
    );

    const SECTION_TEXT: &str = ".text";
    const SECTION_READ_ONLY_DATA: &str = ".rodata";
    const SECTION_DATA: &str = ".data";

    const PRINTF: &str = "printf@PLT";
    const FMOD: &str = "fmod@PLT";
}

pub struct Darwin;

pub struct Linux;

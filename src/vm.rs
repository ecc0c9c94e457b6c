use crate::error::VmError;
use crate::image::load_image;
use crate::instruction::{Instruction, JumpTarget, Operand2};
use crate::memory::{read_one_byte_blocking, Memory};
use crate::registers::{Condition, Register, Registers};
use crate::sign_extend::SignExtend;
use crate::trap::TrapVector;
use log::{debug, warn};
use std::io::{self, Write};
use std::path::Path;

/// What a single fetch-decode-execute step did.
#[derive(Debug, PartialEq, Eq)]
pub enum StepOutcome {
    Continue,
    Halt,
}

/// The LC-3 core: memory, registers, and the fetch-decode-execute loop.
/// Owns no terminal or process-level state. That lives in the CLI's
/// `TerminalGuard`, so independent VMs can be created freely in tests.
pub struct Vm {
    memory: Memory,
    registers: Registers,
}

impl Vm {
    pub fn new() -> Self {
        Self {
            memory: Memory::new(),
            registers: Registers::new(),
        }
    }

    pub fn registers(&self) -> &Registers {
        &self.registers
    }

    /// Direct register/memory pokes. Used by the built-in `--test`
    /// scenario suite to set up known starting conditions, and by unit
    /// tests for the same scenarios.
    pub fn write_register(&mut self, register: Register, value: u16) {
        self.registers.write(register, value);
    }

    pub fn write_memory(&mut self, address: u16, value: u16) {
        self.memory.write(address, value);
    }

    pub fn read_memory(&mut self, address: u16) -> u16 {
        self.memory.read(address)
    }

    pub fn set_pc(&mut self, pc: u16) {
        self.registers.set_pc(pc);
    }

    /// Loads one object image, overwriting any earlier image's contents
    /// at overlapping addresses.
    pub fn load_image(&mut self, path: impl AsRef<Path>) -> Result<(), VmError> {
        let image = load_image(path)?;
        let mut address = image.origin;
        for word in image.words {
            self.memory.write(address, word);
            address = address.wrapping_add(1);
        }
        Ok(())
    }

    /// Loads each image in order, then runs until HALT or a fatal abort.
    pub fn load_images_and_run(&mut self, paths: &[impl AsRef<Path>]) -> Result<(), VmError> {
        for path in paths {
            self.load_image(path)?;
        }
        self.run()
    }

    /// Fetches, decodes, and dispatches until a handler signals halt or
    /// a fatal condition terminates the VM.
    pub fn run(&mut self) -> Result<(), VmError> {
        loop {
            match self.step()? {
                StepOutcome::Continue => {}
                StepOutcome::Halt => return Ok(()),
            }
        }
    }

    /// Same as `run`, but also checks `interrupted` once per fetch so an
    /// external signal handler can stop the loop between instructions
    /// instead of only at the next blocking I/O call.
    pub fn run_with_interrupt_flag(
        &mut self,
        interrupted: &std::sync::atomic::AtomicBool,
    ) -> Result<(), VmError> {
        loop {
            if interrupted.load(std::sync::atomic::Ordering::SeqCst) {
                return Err(VmError::Interrupted);
            }
            match self.step()? {
                StepOutcome::Continue => {}
                StepOutcome::Halt => return Ok(()),
            }
        }
    }

    /// A single fetch-decode-execute cycle.
    pub fn step(&mut self) -> Result<StepOutcome, VmError> {
        let pc = self.registers.pc();
        if pc == 0xffff {
            return Err(VmError::PcOverflow);
        }

        let word = self.memory.read(pc);
        self.registers.set_pc(pc.wrapping_add(1));

        let instruction = Instruction::decode(word);
        debug!("pc={:#06x} instruction={:#06x} decoded={:?}", pc, word, instruction);
        self.execute(instruction)
    }

    fn execute(&mut self, instruction: Instruction) -> Result<StepOutcome, VmError> {
        match instruction {
            Instruction::Br(test, pc_offset) => {
                let taken = match self.registers.cond() {
                    Condition::Neg => test.n,
                    Condition::Zro => test.z,
                    Condition::Pos => test.p,
                };
                if taken {
                    let pc = self.registers.pc();
                    self.registers.set_pc(pc.wrapping_add(pc_offset));
                }
            }

            Instruction::Add(dr, sr1, operand2) => {
                let rhs = self.resolve_operand2(operand2);
                let value = self.registers.read(sr1).wrapping_add(rhs);
                self.registers.write(dr, value);
                self.registers.update_flags(dr);
            }

            Instruction::Ld(dr, pc_offset) => {
                let address = self.registers.pc().wrapping_add(pc_offset);
                let value = self.memory.read(address);
                self.registers.write(dr, value);
                self.registers.update_flags(dr);
            }

            Instruction::St(sr, pc_offset) => {
                let address = self.registers.pc().wrapping_add(pc_offset);
                self.memory.write(address, self.registers.read(sr));
            }

            Instruction::Jsr(target) => {
                let link = self.registers.pc();
                let new_pc = match target {
                    JumpTarget::PcOffset(pc_offset) => link.wrapping_add(pc_offset),
                    JumpTarget::BaseRegister(base_r) => self.registers.read(base_r),
                };
                self.registers.set_pc(new_pc);
                self.registers.write(Register::R7, link);
            }

            Instruction::And(dr, sr1, operand2) => {
                let rhs = self.resolve_operand2(operand2);
                let value = self.registers.read(sr1) & rhs;
                self.registers.write(dr, value);
                self.registers.update_flags(dr);
            }

            Instruction::Ldr(dr, base_r, offset) => {
                let address = self.registers.read(base_r).wrapping_add(offset);
                let value = self.memory.read(address);
                self.registers.write(dr, value);
                self.registers.update_flags(dr);
            }

            Instruction::Str(sr, base_r, offset) => {
                let address = self.registers.read(base_r).wrapping_add(offset);
                self.memory.write(address, self.registers.read(sr));
            }

            Instruction::Unused => {
                return Err(VmError::UndefinedOpcode {
                    opcode: 0x8,
                    pc: self.registers.pc().wrapping_sub(1),
                });
            }

            Instruction::Not(dr, sr) => {
                let value = !self.registers.read(sr);
                self.registers.write(dr, value);
                self.registers.update_flags(dr);
            }

            Instruction::Ldi(dr, pc_offset) => {
                let indirect = self.registers.pc().wrapping_add(pc_offset);
                let address = self.memory.read(indirect);
                let value = self.memory.read(address);
                self.registers.write(dr, value);
                self.registers.update_flags(dr);
            }

            Instruction::Sti(sr, pc_offset) => {
                let indirect = self.registers.pc().wrapping_add(pc_offset);
                let address = self.memory.read(indirect);
                self.memory.write(address, self.registers.read(sr));
            }

            Instruction::Jmp(base_r) => {
                self.registers.set_pc(self.registers.read(base_r));
            }

            Instruction::Reserved => {
                return Err(VmError::UndefinedOpcode {
                    opcode: 0xd,
                    pc: self.registers.pc().wrapping_sub(1),
                });
            }

            Instruction::Lea(dr, pc_offset) => {
                let address = self.registers.pc().wrapping_add(pc_offset);
                self.registers.write(dr, address);
                self.registers.update_flags(dr);
            }

            Instruction::Trap(low8, vector) => return self.execute_trap(low8, vector),
        }

        Ok(StepOutcome::Continue)
    }

    fn resolve_operand2(&self, operand2: Operand2) -> u16 {
        match operand2 {
            Operand2::Register(register) => self.registers.read(register),
            Operand2::Immediate(value) => value,
        }
    }

    fn execute_trap(
        &mut self,
        low8: u8,
        vector: Option<TrapVector>,
    ) -> Result<StepOutcome, VmError> {
        match vector {
            Some(TrapVector::Getc) => {
                let value = read_one_byte_blocking();
                self.registers.write(Register::R0, value);
            }

            Some(TrapVector::Out) => {
                self.putc(self.registers.read(Register::R0))?;
                flush_stdout()?;
            }

            Some(TrapVector::Puts) => {
                let mut address = self.registers.read(Register::R0);
                loop {
                    let word = self.memory.read(address);
                    if word == 0 {
                        break;
                    }
                    self.putc(word)?;
                    address = address.wrapping_add(1);
                }
                flush_stdout()?;
            }

            Some(TrapVector::In) => {
                print!("Enter a character: ");
                flush_stdout()?;
                let value = read_one_byte_blocking();
                self.putc(value)?;
                self.registers.write(Register::R0, value);
                flush_stdout()?;
            }

            Some(TrapVector::Putsp) => {
                let mut address = self.registers.read(Register::R0);
                loop {
                    let word = self.memory.read(address);
                    if word == 0 {
                        break;
                    }
                    self.putc(word & 0xff)?;
                    let high = (word >> 8) & 0xff;
                    if high != 0 {
                        self.putc(high)?;
                    }
                    address = address.wrapping_add(1);
                }
                flush_stdout()?;
            }

            Some(TrapVector::Halt) => {
                print!("HALT\n");
                flush_stdout()?;
                return Ok(StepOutcome::Halt);
            }

            None => {
                warn!("unrecognized trap vector {:#04x}, ignoring", low8);
            }
        }

        Ok(StepOutcome::Continue)
    }

    /// Writes the low 8 bits of `word` as one character.
    fn putc(&self, word: u16) -> Result<(), VmError> {
        let byte = (word & 0xff) as u8;
        io::stdout().write_all(&[byte])?;
        Ok(())
    }
}

fn flush_stdout() -> Result<(), VmError> {
    io::stdout().flush()?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn new_vm() -> Vm {
        Vm::new()
    }

    #[test]
    fn add_register_form() {
        let mut vm = new_vm();
        vm.write_memory(0x3000, 0x1042); // ADD R0, R1, R2
        vm.write_register(Register::R1, 1);
        vm.write_register(Register::R2, 2);

        vm.step().unwrap();

        assert_eq!(vm.registers().read(Register::R0), 3);
        assert_eq!(vm.registers().cond(), Condition::Pos);
        assert_eq!(vm.registers().pc(), 0x3001);
    }

    #[test]
    fn add_immediate_form() {
        let mut vm = new_vm();
        vm.write_memory(0x3000, 0x1062); // ADD R0, R1, #2
        vm.write_register(Register::R1, 1);

        vm.step().unwrap();

        assert_eq!(vm.registers().read(Register::R0), 3);
        assert_eq!(vm.registers().cond(), Condition::Pos);
    }

    #[test]
    fn and_register_form() {
        let mut vm = new_vm();
        vm.write_memory(0x3000, 0x5042); // AND R0, R1, R2
        vm.write_register(Register::R1, 0xff);
        vm.write_register(Register::R2, 0xf0);

        vm.step().unwrap();

        assert_eq!(vm.registers().read(Register::R0), 0xf0);
        assert_eq!(vm.registers().cond(), Condition::Pos);
    }

    #[test]
    fn and_immediate_form() {
        let mut vm = new_vm();
        vm.write_memory(0x3000, 0x506f); // AND R0, R1, #0xf
        vm.write_register(Register::R1, 0xff);

        vm.step().unwrap();

        assert_eq!(vm.registers().read(Register::R0), 0x0f);
        assert_eq!(vm.registers().cond(), Condition::Pos);
    }

    #[test]
    fn not_instruction() {
        let mut vm = new_vm();
        vm.write_memory(0x3000, 0x907f); // NOT R0, R1
        vm.write_register(Register::R1, 0x000f);

        vm.step().unwrap();

        assert_eq!(vm.registers().read(Register::R0), 0xfff0);
        assert_eq!(vm.registers().cond(), Condition::Neg);
    }

    #[test]
    fn ldi_chain() {
        let mut vm = new_vm();
        vm.write_memory(0x3000, 0xa001); // LDI R0, #1
        vm.write_memory(0x3002, 0x4000);
        vm.write_memory(0x4000, 0x1234);

        vm.step().unwrap();

        assert_eq!(vm.registers().read(Register::R0), 0x1234);
        assert_eq!(vm.registers().cond(), Condition::Pos);
    }

    #[test]
    fn halt_stops_the_loop() {
        let mut vm = new_vm();
        vm.write_memory(0x3000, 0xf025); // TRAP HALT

        let outcome = vm.step().unwrap();

        assert_eq!(outcome, StepOutcome::Halt);
    }

    #[test]
    fn br_skips_when_no_flag_matches() {
        let mut vm = new_vm();
        vm.write_memory(0x3000, 0x0000); // BR with n=z=p=0
        vm.set_pc(0x3000);

        vm.step().unwrap();

        assert_eq!(vm.registers().pc(), 0x3001);
    }

    #[test]
    fn jsr_always_writes_r7_even_via_base_register() {
        let mut vm = new_vm();
        vm.write_memory(0x3000, 0x4040); // JSRR R1 (bit 11 clear)
        vm.write_register(Register::R1, 0x5000);

        vm.step().unwrap();

        assert_eq!(vm.registers().pc(), 0x5000);
        assert_eq!(vm.registers().read(Register::R7), 0x3001);
    }

    #[test]
    fn add_wraps_silently_on_overflow() {
        let mut vm = new_vm();
        vm.write_memory(0x3000, 0x1042); // ADD R0, R1, R2
        vm.write_register(Register::R1, 0xffff);
        vm.write_register(Register::R2, 1);

        vm.step().unwrap();

        assert_eq!(vm.registers().read(Register::R0), 0);
        assert_eq!(vm.registers().cond(), Condition::Zro);
    }

    #[test]
    fn unused_opcode_aborts() {
        let mut vm = new_vm();
        vm.write_memory(0x3000, 0x8000); // RTI

        let err = vm.step().unwrap_err();
        assert!(matches!(err, VmError::UndefinedOpcode { opcode: 0x8, .. }));
    }

    #[test]
    fn reserved_opcode_aborts() {
        let mut vm = new_vm();
        vm.write_memory(0x3000, 0xd000); // RES

        let err = vm.step().unwrap_err();
        assert!(matches!(err, VmError::UndefinedOpcode { opcode: 0xd, .. }));
    }

    #[test]
    fn pc_overflow_is_detected_before_the_fetch() {
        let mut vm = new_vm();
        vm.set_pc(0xffff);

        let err = vm.step().unwrap_err();
        assert!(matches!(err, VmError::PcOverflow));
    }

    #[test]
    fn lea_does_not_touch_memory() {
        let mut vm = new_vm();
        vm.write_memory(0x3000, 0xe002); // LEA R0, #2
        vm.step().unwrap();

        assert_eq!(vm.registers().read(Register::R0), 0x3000 + 1 + 2);
    }

    #[test]
    fn unrecognized_trap_is_a_no_op() {
        let mut vm = new_vm();
        vm.write_memory(0x3000, 0xf099); // TRAP 0x99, unrecognized

        let outcome = vm.step().unwrap();

        assert_eq!(outcome, StepOutcome::Continue);
    }
}

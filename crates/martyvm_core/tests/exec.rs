/*
    MartyVM
    https://github.com/dbalsom/martyvm

    Copyright 2022-2025 Daniel Balsom

    Permission is hereby granted, free of charge, to any person obtaining a
    copy of this software and associated documentation files (the “Software”),
    to deal in the Software without restriction, including without limitation
    the rights to use, copy, modify, merge, publish, distribute, sublicense,
    and/or sell copies of the Software, and to permit persons to whom the
    Software is furnished to do so, subject to the following conditions:

    The above copyright notice and this permission notice shall be included in
    all copies or substantial portions of the Software.

    THE SOFTWARE IS PROVIDED “AS IS”, WITHOUT WARRANTY OF ANY KIND, EXPRESS OR
    IMPLIED, INCLUDING BUT NOT LIMITED TO THE WARRANTIES OF MERCHANTABILITY,
    FITNESS FOR A PARTICULAR PURPOSE AND NONINFRINGEMENT. IN NO EVENT SHALL THE
    AUTHORS OR COPYRIGHT HOLDERS BE LIABLE FOR ANY CLAIM, DAMAGES OR OTHER
    LIABILITY, WHETHER IN AN ACTION OF CONTRACT, TORT OR OTHERWISE, ARISING
    FROM, OUT OF OR IN CONNECTION WITH THE SOFTWARE OR THE USE OR OTHER
    DEALINGS IN THE SOFTWARE.

    ---------------------------------------------------------------------------

    tests::exec.rs

    End-to-end decode+execute tests against the flat-memory harness:
    deferred stores, LOCK routing, REP partial execution, RIP-relative
    resolution, and fault unwinding.

*/

mod common;

use common::{IoDelegate, TestBus};
use martyvm_core::{
    cpu_common::{
        Register16,
        Register32,
        Register64,
        Register8,
        Segment,
    },
    cpu_x86::{Flag, CPU_FLAG_ZERO},
    CodeWindow,
    CpuError,
    CpuException,
    CpuMode,
    CpuModel,
    CpuX86,
    NullDelegate,
    StepResult,
    VendorPolicy,
};

fn cpu16() -> CpuX86 {
    let mut cpu = CpuX86::new(CpuMode::Mode16, CpuModel::Cpu80386, VendorPolicy::Intel);
    cpu.regs.set_segment_real(Segment::DS, 0);
    cpu.regs.set_segment_real(Segment::ES, 0);
    cpu.regs.set_segment_real(Segment::SS, 0);
    cpu
}

fn cpu32() -> CpuX86 {
    let mut cpu = CpuX86::new(CpuMode::Mode32, CpuModel::Cpu64, VendorPolicy::Intel);
    cpu.regs.set_segment(Segment::DS, 0, 0);
    cpu.regs.set_segment(Segment::ES, 0, 0);
    cpu.regs.set_segment(Segment::SS, 0, 0);
    cpu
}

fn cpu64() -> CpuX86 {
    CpuX86::new(CpuMode::Mode64, CpuModel::Cpu64, VendorPolicy::Intel)
}

fn step(cpu: &mut CpuX86, bus: &mut TestBus, code: &[u8]) -> Result<StepResult, CpuError> {
    let mut window = CodeWindow::new(code, cpu.regs.rip);
    let mut delegate = NullDelegate::default();
    cpu.step(&mut window, bus, &mut delegate).map(|(r, _)| r)
}

#[test]
fn add_imm_wraps_with_carry() {
    let mut cpu = cpu64();
    let mut bus = TestBus::new(0x1000);
    cpu.regs.write_g64(Register64::RAX, u64::MAX);
    step(&mut cpu, &mut bus, &[0x48, 0x05, 0x01, 0x00, 0x00, 0x00]).unwrap();
    assert_eq!(cpu.regs.read_g64(Register64::RAX), 0);
    assert!(cpu.get_flag(Flag::Carry));
    assert!(cpu.get_flag(Flag::Zero));
    assert_eq!(cpu.regs.rip, 6);
}

#[test]
fn add_memory_destination_16bit() {
    let mut cpu = cpu16();
    let mut bus = TestBus::new(0x2000);
    bus.mem[0x1000] = 0x34;
    bus.mem[0x1001] = 0x12;
    cpu.regs.write_g16(Register16::BX, 0x1111);
    // add [0x1000], bx
    step(&mut cpu, &mut bus, &[0x01, 0x1E, 0x00, 0x10]).unwrap();
    assert_eq!(bus.mem[0x1000], 0x45);
    assert_eq!(bus.mem[0x1001], 0x23);
    // Destination went through the rmw protocol, unlocked.
    assert_eq!(bus.rmw_begins, 1);
    assert_eq!(bus.rmw_commits, 1);
    assert_eq!(bus.locked_begins, 0);
}

#[test]
fn faulting_destination_commits_nothing() {
    let mut cpu = cpu16();
    let mut bus = TestBus::new(0x2000);
    bus.fault_range = Some((0x1000, 0x1002));
    cpu.regs.write_g16(Register16::BX, 0x1111);
    cpu.regs.set_flags(CPU_FLAG_ZERO | 0x2);
    let flags_before = cpu.regs.flags();

    let r = step(&mut cpu, &mut bus, &[0x01, 0x1E, 0x00, 0x10]);
    assert!(matches!(r, Err(CpuError::Exception(CpuException::PageFault))));
    // The mapping step faulted before the helper ran: flags, registers,
    // memory, and RIP are all untouched.
    assert_eq!(cpu.regs.flags(), flags_before);
    assert_eq!(cpu.regs.rip, 0);
    assert_eq!(bus.rmw_commits, 0);
}

#[test]
fn lock_inc_routes_through_locked_rmw() {
    let mut cpu = cpu32();
    let mut bus = TestBus::new(0x2000);
    bus.mem[0x100] = 41;
    // lock inc dword [0x100]
    step(&mut cpu, &mut bus, &[0xF0, 0xFF, 0x05, 0x00, 0x01, 0x00, 0x00]).unwrap();
    assert_eq!(bus.mem[0x100], 42);
    assert_eq!(bus.locked_begins, 1);
    assert_eq!(bus.rmw_commits, 1);
}

#[test]
fn lock_on_unlockable_instruction_is_ud() {
    let mut cpu = cpu32();
    let mut bus = TestBus::new(0x100);
    // lock mov eax, ebx - not a lockable form.
    let r = step(&mut cpu, &mut bus, &[0xF0, 0x89, 0xD8]);
    assert!(matches!(r, Err(CpuError::Exception(CpuException::InvalidOpcode))));
}

#[test]
fn rep_stosb_fills_and_counts_down() {
    let mut cpu = cpu16();
    let mut bus = TestBus::new(0x1000);
    cpu.regs.write_g8(Register8::AL, 0xAA);
    cpu.regs.write_g16(Register16::DI, 0x20);
    cpu.regs.write_g16(Register16::CX, 5);
    step(&mut cpu, &mut bus, &[0xF3, 0xAA]).unwrap();
    assert_eq!(&bus.mem[0x20..0x25], &[0xAA; 5]);
    assert_eq!(bus.mem[0x25], 0);
    assert_eq!(cpu.regs.read_g16(Register16::CX), 0);
    assert_eq!(cpu.regs.read_g16(Register16::DI), 0x25);
}

#[test]
fn rep_movsb_faults_mid_iteration_with_partial_state() {
    let mut cpu = cpu16();
    let mut bus = TestBus::new(0x1000);
    for n in 0..5 {
        bus.mem[0x10 + n] = n as u8 + 1;
    }
    bus.fault_range = Some((0x12, 0x13));
    cpu.regs.write_g16(Register16::SI, 0x10);
    cpu.regs.write_g16(Register16::DI, 0x40);
    cpu.regs.write_g16(Register16::CX, 5);

    let r = step(&mut cpu, &mut bus, &[0xF3, 0xA4]);
    assert!(matches!(r, Err(CpuError::Exception(CpuException::PageFault))));

    // Two iterations completed; the faulting third left no partial write.
    assert_eq!(cpu.regs.read_g16(Register16::CX), 3);
    assert_eq!(cpu.regs.read_g16(Register16::SI), 0x12);
    assert_eq!(cpu.regs.read_g16(Register16::DI), 0x42);
    assert_eq!(&bus.mem[0x40..0x43], &[1, 2, 0]);
    // RIP still points at the instruction so the VM engine can resume the
    // remaining iterations after handling the fault.
    assert_eq!(cpu.regs.rip, 0);
}

#[test]
fn rip_relative_load() {
    let mut cpu = cpu64();
    let mut bus = TestBus::new(0x1000);
    bus.mem[0x100..0x108].copy_from_slice(&0xDEAD_BEEF_1234_5678u64.to_le_bytes());
    // mov rax, [rip + 0xF9]; instruction is 7 bytes, so EA = 7 + 0xF9.
    step(&mut cpu, &mut bus, &[0x48, 0x8B, 0x05, 0xF9, 0x00, 0x00, 0x00]).unwrap();
    assert_eq!(cpu.regs.read_g64(Register64::RAX), 0xDEAD_BEEF_1234_5678);
}

#[test]
fn divide_error_leaves_rip_at_instruction() {
    let mut cpu = cpu32();
    let mut bus = TestBus::new(0x100);
    cpu.regs.write_g32(Register32::EAX, 100);
    cpu.regs.write_g32(Register32::EDX, 0);
    cpu.regs.write_g32(Register32::EBX, 0);
    let r = step(&mut cpu, &mut bus, &[0xF7, 0xF3]); // div ebx
    assert!(matches!(r, Err(CpuError::Exception(CpuException::DivideError))));
    assert_eq!(cpu.regs.rip, 0);
    assert_eq!(cpu.regs.read_g32(Register32::EAX), 100);
}

#[test]
fn conditional_jump_taken_and_not_taken() {
    let mut cpu = cpu16();
    let mut bus = TestBus::new(0x100);
    cpu.regs.set_flags(CPU_FLAG_ZERO | 0x2);
    let r = step(&mut cpu, &mut bus, &[0x74, 0x02]).unwrap(); // jz +2
    assert_eq!(r, StepResult::Jump);
    assert_eq!(cpu.regs.rip, 4);

    let mut cpu = cpu16();
    let r = step(&mut cpu, &mut bus, &[0x74, 0x02]).unwrap();
    assert_eq!(r, StepResult::Normal);
    assert_eq!(cpu.regs.rip, 2);
}

#[test]
fn push_pop_round_trip_64() {
    let mut cpu = cpu64();
    let mut bus = TestBus::new(0x1000);
    cpu.regs.write_g64(Register64::RSP, 0x200);
    cpu.regs.write_g64(Register64::RAX, 0x1122_3344_5566_7788);

    step(&mut cpu, &mut bus, &[0x50]).unwrap(); // push rax
    assert_eq!(cpu.regs.read_g64(Register64::RSP), 0x1F8);

    step(&mut cpu, &mut bus, &[0x5B]).unwrap(); // pop rbx
    assert_eq!(cpu.regs.read_g64(Register64::RSP), 0x200);
    assert_eq!(cpu.regs.read_g64(Register64::RBX), 0x1122_3344_5566_7788);
}

#[test]
fn movzx_zero_extends() {
    let mut cpu = cpu32();
    let mut bus = TestBus::new(0x100);
    cpu.regs.write_g32(Register32::EAX, 0xFFFF_FFFF);
    cpu.regs.write_g8(Register8::BL, 0x80);
    step(&mut cpu, &mut bus, &[0x0F, 0xB6, 0xC3]).unwrap(); // movzx eax, bl
    assert_eq!(cpu.regs.read_g32(Register32::EAX), 0x80);
}

#[test]
fn port_io_goes_through_delegate() {
    let mut cpu = cpu16();
    let mut bus = TestBus::new(0x100);
    let mut delegate = IoDelegate {
        in_value: 0x99,
        ..Default::default()
    };
    let code = [0xE4, 0x60]; // in al, 0x60
    let mut window = CodeWindow::new(&code, 0);
    cpu.step(&mut window, &mut bus, &mut delegate).unwrap();
    assert_eq!(cpu.regs.read_g8(Register8::AL), 0x99);
    assert_eq!(delegate.reads, vec![(0x60, 8)]);

    cpu.regs.write_g8(Register8::AL, 0x42);
    let code = [0xE6, 0x61]; // out 0x61, al
    let mut window = CodeWindow::new(&code, cpu.regs.rip);
    cpu.step(&mut window, &mut bus, &mut delegate).unwrap();
    assert_eq!(delegate.writes, vec![(0x61, 0x42)]);
}

#[test]
fn cmpxchg_success_and_failure() {
    let mut cpu = cpu32();
    let mut bus = TestBus::new(0x1000);
    bus.mem[0x100..0x104].copy_from_slice(&100u32.to_le_bytes());
    cpu.regs.write_g32(Register32::EAX, 100);
    cpu.regs.write_g32(Register32::ECX, 555);
    // cmpxchg [0x100], ecx
    step(&mut cpu, &mut bus, &[0x0F, 0xB1, 0x0D, 0x00, 0x01, 0x00, 0x00]).unwrap();
    assert!(cpu.get_flag(Flag::Zero));
    assert_eq!(&bus.mem[0x100..0x104], &555u32.to_le_bytes());

    // Second round: accumulator no longer matches.
    cpu.regs.rip = 0;
    step(&mut cpu, &mut bus, &[0x0F, 0xB1, 0x0D, 0x00, 0x01, 0x00, 0x00]).unwrap();
    assert!(!cpu.get_flag(Flag::Zero));
    assert_eq!(cpu.regs.read_g32(Register32::EAX), 555);
}

#[test]
fn x87_load_compute_store() {
    let mut cpu = cpu32();
    let mut bus = TestBus::new(0x1000);
    bus.mem[0x100..0x104].copy_from_slice(&1.5f32.to_bits().to_le_bytes());

    // fld dword [0x100]
    step(&mut cpu, &mut bus, &[0xD9, 0x05, 0x00, 0x01, 0x00, 0x00]).unwrap();
    // fadd st(0), st(0) -> 3.0
    cpu.regs.rip = 0;
    step(&mut cpu, &mut bus, &[0xD8, 0xC0]).unwrap();
    // fstp qword [0x108]
    cpu.regs.rip = 0;
    step(&mut cpu, &mut bus, &[0xDD, 0x1D, 0x08, 0x01, 0x00, 0x00]).unwrap();

    let bits = u64::from_le_bytes(bus.mem[0x108..0x110].try_into().unwrap());
    assert_eq!(f64::from_bits(bits), 3.0);
    // Stack is empty again.
    assert_eq!(cpu.fpu.st(0), None);
}

#[test]
fn std_reverses_string_direction() {
    let mut cpu = cpu16();
    let mut bus = TestBus::new(0x100);
    cpu.regs.write_g16(Register16::AX, 0xBEEF);
    cpu.regs.write_g16(Register16::DI, 0x10);
    step(&mut cpu, &mut bus, &[0xFD]).unwrap(); // std
    cpu.regs.rip = 0;
    step(&mut cpu, &mut bus, &[0xAB]).unwrap(); // stosw
    assert_eq!(&bus.mem[0x10..0x12], &[0xEF, 0xBE]);
    assert_eq!(cpu.regs.read_g16(Register16::DI), 0x0E);
}

#[test]
fn unimplemented_is_distinct_from_invalid() {
    let mut cpu = cpu64();
    let mut bus = TestBus::new(0x100);

    // 0F 58 (addps) decodes but is not executed by this core.
    let r = step(&mut cpu, &mut bus, &[0x0F, 0x58, 0xC1]);
    assert!(matches!(r, Err(CpuError::UnhandledInstruction(_, _))));

    // 0F 0B (ud2) is architecturally invalid.
    let r = step(&mut cpu, &mut bus, &[0x0F, 0x0B]);
    assert!(matches!(r, Err(CpuError::Exception(CpuException::InvalidOpcode))));
}

#[test]
fn aam_zero_immediate_divide_error() {
    let mut cpu = cpu16();
    let mut bus = TestBus::new(0x100);
    cpu.regs.write_g16(Register16::AX, 0x0025);
    let r = step(&mut cpu, &mut bus, &[0xD4, 0x00]); // aam 0
    assert!(matches!(r, Err(CpuError::Exception(CpuException::DivideError))));
    assert_eq!(cpu.regs.read_g16(Register16::AX), 0x0025);
}

#[test]
fn segment_override_applies_to_source() {
    let mut cpu = cpu16();
    let mut bus = TestBus::new(0x2000);
    cpu.regs.set_segment_real(Segment::ES, 0x100); // base 0x1000
    bus.mem[0x1010] = 0x5A;
    cpu.regs.write_g16(Register16::BX, 0x10);
    // mov al, es:[bx]
    step(&mut cpu, &mut bus, &[0x26, 0x8A, 0x07]).unwrap();
    assert_eq!(cpu.regs.read_g8(Register8::AL), 0x5A);
}
